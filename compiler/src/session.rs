use std::io::{self, Write};

use crate::codegen::{Signatures, lower_function, lower_prototype};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::jit::Engine;
use crate::lexer::{Lexer, Token};
use crate::llvm::{function_to_string, module_to_string};
use crate::parser::{ANON_FN_NAME, Parser};
use crate::ssa::Module;


pub const MODULE_NAME: &str = "my cool jit";

/// Everything that lives for the duration of one interactive run: the
/// parser over the input, the module currently receiving functions, the
/// signatures of every function seen so far and the engine holding the
/// compiled ones.
pub struct Session<'a, O: Write, E: Write> {
    parser: Parser<'a>,
    engine: Engine,
    signatures: Signatures,
    module: Module,
    out: O,
    err: E,
    prompt: bool,
    print_module_at_exit: bool,
}

impl<'a, O: Write, E: Write> Session<'a, O, E> {
    pub fn new(lexer: Lexer<'a>, config: &Config, out: O, err: E) -> Session<'a, O, E> {
        Session {
            parser: Parser::new(lexer, config.precedence_table()),
            engine: Engine::with_runtime(config.engine.max_call_depth),
            signatures: Signatures::new(),
            module: Module::new(MODULE_NAME),
            out,
            err,
            prompt: config.prompt,
            print_module_at_exit: config.print_module_at_exit,
        }
    }

    #[cfg(test)]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[cfg(test)]
    pub fn signatures(&self) -> &Signatures {
        &self.signatures
    }

    /// Reads and runs statements until the input ends. Only a failure to
    /// write output stops the loop early.
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            if self.prompt {
                write!(self.err, "ready> ")?;
                self.err.flush()?;
            }

            let result = match self.parser.current() {
                Token::Eof => return self.finish(),
                Token::Char(';') => {
                    self.parser.next_token();
                    continue;
                }
                Token::Def => self.handle_definition(),
                Token::Extern => self.handle_extern(),
                _ => self.handle_top_level_expression(),
            };

            match result {
                Ok(()) => {}
                Err(Error::Io(e)) => return Err(e),
                Err(e) => {
                    log::debug!("statement failed: {:?}", e);
                    writeln!(self.err, "Error:{}", e)?;
                    if let Error::Parse(_) = e {
                        self.parser.next_token();
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.print_module_at_exit {
            write!(self.out, "{}", module_to_string(&self.module))?;
        }
        self.out.flush()
    }

    /// Replaces the open module with an empty one and returns the old one.
    fn open_new_module(&mut self) -> Module {
        std::mem::replace(&mut self.module, Module::new(MODULE_NAME))
    }

    fn print_function(&mut self, name: &str) -> Result<()> {
        if let Some(function) = self.module.get_function(name) {
            let ir = function_to_string(function);
            writeln!(self.out, "{}", ir)?;
        }
        Ok(())
    }

    fn handle_definition(&mut self) -> Result<()> {
        let def = self.parser.parse_definition()?;
        log::info!("Parsed a function definition.");

        lower_function(&mut self.module, &mut self.signatures, &def)?;
        self.print_function(&def.proto.name)?;

        let module = self.open_new_module();
        self.engine.add_module(module)?;
        Ok(())
    }

    fn handle_extern(&mut self) -> Result<()> {
        let proto = self.parser.parse_extern()?;
        log::info!("Parsed an extern");

        let ir = function_to_string(lower_prototype(&mut self.module, &proto));
        writeln!(self.out, "{}", ir)?;
        self.signatures.insert(proto.name.clone(), proto);
        Ok(())
    }

    fn handle_top_level_expression(&mut self) -> Result<()> {
        let def = self.parser.parse_top_level_expr()?;
        log::info!("Parsed a top-level expr");

        lower_function(&mut self.module, &mut self.signatures, &def)?;
        self.print_function(ANON_FN_NAME)?;

        let tracker = self.engine.create_resource_tracker();
        let module = self.open_new_module();
        let engine = &mut self.engine;
        let result = engine.add_module_tracked(module, &tracker)
            .and_then(|()| engine.lookup(ANON_FN_NAME))
            .and_then(|code| engine.call(&code, &[]));
        engine.remove(tracker);

        let value = result?;
        writeln!(self.out, "Evaluated to {}", runtime::format_f(value))?;
        Ok(())
    }
}
