use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::EngineError;
use crate::ssa::{BinOp, BlockExit, BlockId, Function, Module, Op, Predicate, verify_function};


pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// A primitive supplied by the host process rather than by compiled code.
#[derive(Clone, Copy)]
pub struct HostFunction {
    pub arity: usize,
    pub call: fn(&[f64]) -> f64,
}

/// Owns the symbols of the modules added under it; consumed by
/// `Engine::remove`, so it can be released only once.
#[derive(Debug, PartialEq, Eq)]
pub struct ResourceTracker(u64);

/// Compiled form of a function, ready to be called.
#[derive(Debug)]
pub struct CompiledFunction {
    function: Function,
    register_count: usize,
}

impl CompiledFunction {
    fn new(function: Function) -> CompiledFunction {
        let register_count = function.blocks.iter()
            .flat_map(|b| b.ops.iter())
            .map(|op| op.dst() as usize + 1)
            .max()
            .unwrap_or(0)
            .max(function.arity());
        CompiledFunction { function, register_count }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn arity(&self) -> usize {
        self.function.arity()
    }
}

struct Symbol {
    code: Rc<CompiledFunction>,
    tracker: Option<u64>,
}

enum Callee {
    Compiled(Rc<CompiledFunction>),
    Host(HostFunction),
}

pub struct Engine {
    /// Every definition of a name, newest last; the newest one is visible.
    symbols: HashMap<String, Vec<Symbol>>,
    host: HashMap<String, HostFunction>,
    next_tracker: u64,
    max_call_depth: usize,
}

impl Default for Engine {
    fn default() -> Engine {
        Engine::new(DEFAULT_MAX_CALL_DEPTH)
    }
}

impl Engine {
    pub fn new(max_call_depth: usize) -> Engine {
        Engine {
            symbols: HashMap::new(),
            host: HashMap::new(),
            next_tracker: 0,
            max_call_depth,
        }
    }

    /// An engine that resolves `putchard` and `printd` from the runtime.
    pub fn with_runtime(max_call_depth: usize) -> Engine {
        let mut engine = Engine::new(max_call_depth);
        engine.register_host("putchard", HostFunction { arity: 1, call: |args| runtime::putchard(args[0]) });
        engine.register_host("printd", HostFunction { arity: 1, call: |args| runtime::printd(args[0]) });
        engine
    }

    pub fn register_host(&mut self, name: &str, function: HostFunction) {
        self.host.insert(name.to_string(), function);
    }

    pub fn create_resource_tracker(&mut self) -> ResourceTracker {
        let tracker = ResourceTracker(self.next_tracker);
        self.next_tracker += 1;
        tracker
    }

    /// Makes every function defined in `module` permanently callable.
    pub fn add_module(&mut self, module: Module) -> Result<(), EngineError> {
        self.add(module, None)
    }

    /// Like `add_module`, but the symbols go away again on `remove(tracker)`.
    pub fn add_module_tracked(&mut self, module: Module, tracker: &ResourceTracker) -> Result<(), EngineError> {
        self.add(module, Some(tracker.0))
    }

    fn add(&mut self, module: Module, tracker: Option<u64>) -> Result<(), EngineError> {
        let mut seen = HashSet::new();
        for function in module.definitions() {
            if !seen.insert(function.name.as_str()) {
                return Err(EngineError::Redefinition(function.name.clone()));
            }
            verify_function(function)?;
        }

        for function in module.functions.into_iter().filter(|f| !f.is_declaration()) {
            log::debug!("jit: materialized {} from module '{}'", function.name, module.name);
            let name = function.name.clone();
            let code = Rc::new(CompiledFunction::new(function));
            self.symbols.entry(name).or_default().push(Symbol { code, tracker });
        }
        Ok(())
    }

    /// Frees everything added under `tracker`. A definition it shadowed
    /// becomes visible again.
    pub fn remove(&mut self, tracker: ResourceTracker) -> usize {
        let mut removed = 0;
        for defs in self.symbols.values_mut() {
            let before = defs.len();
            defs.retain(|s| s.tracker != Some(tracker.0));
            removed += before - defs.len();
        }
        self.symbols.retain(|_, defs| !defs.is_empty());
        log::debug!("jit: released tracker {} ({} symbols)", tracker.0, removed);
        removed
    }

    pub fn lookup(&self, name: &str) -> Result<Rc<CompiledFunction>, EngineError> {
        self.symbols.get(name)
            .and_then(|defs| defs.last())
            .map(|s| Rc::clone(&s.code))
            .ok_or_else(|| EngineError::SymbolNotFound(name.to_string()))
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    fn resolve(&self, name: &str) -> Result<Callee, EngineError> {
        if let Ok(code) = self.lookup(name) {
            return Ok(Callee::Compiled(code));
        }
        self.host.get(name)
            .map(|h| Callee::Host(*h))
            .ok_or_else(|| EngineError::SymbolNotFound(name.to_string()))
    }

    /// Runs `function` to completion. Calls between compiled functions push
    /// frames on a heap stack, so only `max_call_depth` bounds recursion.
    pub fn call(&self, function: &Rc<CompiledFunction>, args: &[f64]) -> Result<f64, EngineError> {
        let mut current = self.enter(Rc::clone(function), args, 0)?;
        let mut callers: Vec<Frame> = Vec::new();

        loop {
            match current.step(self)? {
                Step::Continue => {}
                Step::Call(callee, args) => {
                    let frame = self.enter(callee, &args, callers.len() + 1)?;
                    callers.push(std::mem::replace(&mut current, frame));
                }
                Step::Return(value) => match callers.pop() {
                    Some(caller) => {
                        current = caller;
                        current.resume(value);
                    }
                    None => return Ok(value),
                },
            }
        }
    }

    fn enter(&self, code: Rc<CompiledFunction>, args: &[f64], depth: usize) -> Result<Frame, EngineError> {
        if args.len() != code.arity() {
            return Err(EngineError::ArgumentCount {
                name: code.name().to_string(),
                expected: code.arity(),
                got: args.len(),
            });
        }
        if depth >= self.max_call_depth {
            return Err(EngineError::CallStackExhausted(code.name().to_string()));
        }
        let entry = code.function.entry()
            .ok_or_else(|| EngineError::SymbolNotFound(code.name().to_string()))?;

        let mut regs = vec![0.0; code.register_count];
        regs[..args.len()].copy_from_slice(args);
        let mut frame = Frame { code, regs, block: entry, previous: None, pc: 0 };
        frame.run_phis();
        Ok(frame)
    }
}

/// What a frame needs next after running as far as it can on its own.
enum Step {
    Continue,
    Call(Rc<CompiledFunction>, Vec<f64>),
    Return(f64),
}

/// Activation of one compiled function: its registers and the position
/// of the next op to run.
struct Frame {
    code: Rc<CompiledFunction>,
    regs: Vec<f64>,
    block: BlockId,
    previous: Option<BlockId>,
    pc: usize,
}

impl Frame {
    /// Evaluates the phis leading the current block. They read their
    /// inputs before any of them is written.
    fn run_phis(&mut self) {
        let code = Rc::clone(&self.code);
        let block = code.function.block(self.block);
        let previous = self.previous;

        let mut values = Vec::new();
        let mut leading = 0;
        for op in &block.ops {
            match op {
                Op::Phi { dst, incoming } => {
                    leading += 1;
                    if let Some((r, _)) = incoming.iter().find(|(_, b)| Some(*b) == previous) {
                        values.push((*dst, self.regs[*r as usize]));
                    }
                }
                _ => break,
            }
        }
        self.pc = leading;
        for (dst, value) in values {
            self.regs[dst as usize] = value;
        }
    }

    fn jump(&mut self, target: BlockId) {
        self.previous = Some(self.block);
        self.block = target;
        self.run_phis();
    }

    /// Stores the result of the call this frame was suspended on.
    fn resume(&mut self, value: f64) {
        let dst = self.code.function.block(self.block).ops[self.pc].dst();
        self.regs[dst as usize] = value;
        self.pc += 1;
    }

    fn step(&mut self, engine: &Engine) -> Result<Step, EngineError> {
        let code = Rc::clone(&self.code);
        let block = code.function.block(self.block);

        while let Some(op) = block.ops.get(self.pc) {
            let regs = &self.regs;
            let value = match op {
                Op::Phi { dst, .. } => regs[*dst as usize],
                Op::Const { value, .. } => *value,
                Op::Binary { left, right, operator, .. } => {
                    let (l, r) = (regs[*left as usize], regs[*right as usize]);
                    match operator {
                        BinOp::Add => l + r,
                        BinOp::Sub => l - r,
                        BinOp::Mul => l * r,
                        BinOp::Div => l / r,
                    }
                }
                Op::Compare { left, right, predicate, .. } => {
                    let (l, r) = (regs[*left as usize], regs[*right as usize]);
                    let holds = match predicate {
                        Predicate::Ult => !(l >= r),
                        Predicate::One => l < r || l > r,
                    };
                    if holds { 1.0 } else { 0.0 }
                }
                Op::UIToFP { src, .. } => regs[*src as usize],
                Op::Call { function: callee, args, .. } => {
                    let arg_values: Vec<f64> = args.iter().map(|r| regs[*r as usize]).collect();
                    match engine.resolve(callee)? {
                        Callee::Compiled(code) => return Ok(Step::Call(code, arg_values)),
                        Callee::Host(host) => {
                            if host.arity != arg_values.len() {
                                return Err(EngineError::ArgumentCount {
                                    name: callee.clone(),
                                    expected: host.arity,
                                    got: arg_values.len(),
                                });
                            }
                            (host.call)(&arg_values)
                        }
                    }
                }
            };
            self.regs[op.dst() as usize] = value;
            self.pc += 1;
        }

        match block.exit {
            Some(BlockExit::Return(r)) => Ok(Step::Return(self.regs[r as usize])),
            Some(BlockExit::UnconditionalJump(target)) => {
                self.jump(target);
                Ok(Step::Continue)
            }
            Some(BlockExit::Branch(cond, positive, negative)) => {
                let target = if self.regs[cond as usize] != 0.0 { positive } else { negative };
                self.jump(target);
                Ok(Step::Continue)
            }
            None => Err(EngineError::Unterminated {
                function: code.name().to_string(),
                block: format!("{}{}", block.label, self.block),
            }),
        }
    }
}


#[cfg(test)]
mod test {
    use crate::ast::{Expr, FunDefinition, Prototype};
    use crate::codegen::{Signatures, lower_function};
    use crate::error::EngineError;
    use std::rc::Rc;
    use crate::ssa::{FunctionBuilder, Function, Module};
    use super::{CompiledFunction, Engine, HostFunction};

    fn module_of(defs: Vec<FunDefinition>) -> Module {
        let mut module = Module::new("test");
        let mut signatures = Signatures::new();
        for def in defs {
            lower_function(&mut module, &mut signatures, &def).unwrap();
        }
        module
    }

    fn def(name: &str, params: Vec<&str>, body: Expr) -> FunDefinition {
        FunDefinition::new(Prototype::new(name, params), body)
    }

    fn run(engine: &Engine, name: &str, args: &[f64]) -> Result<f64, EngineError> {
        let f = engine.lookup(name)?;
        engine.call(&f, args)
    }

    #[test]
    fn arithmetic() {
        let mut engine = Engine::default();
        engine.add_module(module_of(vec![
            def("f", vec!["a", "b"],
                Expr::minus(
                    Expr::times(Expr::var("a"), Expr::var("b")),
                    Expr::binop('/', Expr::var("a"), Expr::number(4.0)))),
        ])).unwrap();
        assert_eq!(run(&engine, "f", &[2.0, 3.0]), Ok(5.5));
    }

    #[test]
    fn loops() {
        use std::cell::Cell;
        thread_local!(static COUNT: Cell<f64> = Cell::new(0.0));

        let mut engine = Engine::default();
        engine.register_host("tick", HostFunction {
            arity: 1,
            call: |args| COUNT.with(|c| { c.set(c.get() + args[0] + 1.0); 0.0 }),
        });
        let mut signatures = Signatures::new();
        signatures.insert("tick".to_string(), Prototype::new("tick", vec!["x"]));
        let mut module = Module::new("test");
        lower_function(&mut module, &mut signatures, &def("loop", vec!["n"],
            Expr::for_loop(
                "i",
                Expr::number(0.0),
                Expr::less(Expr::var("i"), Expr::var("n")),
                None,
                Expr::call("tick", vec![Expr::var("i")])))).unwrap();
        engine.add_module(module).unwrap();

        // the end test follows the body, so the body sees i = 0, 1, 2, 3, 4
        assert_eq!(run(&engine, "loop", &[4.0]), Ok(0.0));
        assert_eq!(COUNT.with(|c| c.get()), 15.0);

        // start already fails the end test: the body never runs
        assert_eq!(run(&engine, "loop", &[0.0]), Ok(0.0));
        assert_eq!(COUNT.with(|c| c.get()), 15.0);
    }

    #[test]
    fn recursion() {
        let mut engine = Engine::default();
        engine.add_module(module_of(vec![
            def("fib", vec!["x"],
                Expr::cond(
                    Expr::less(Expr::var("x"), Expr::number(3.0)),
                    Expr::number(1.0),
                    Expr::plus(
                        Expr::call("fib", vec![Expr::minus(Expr::var("x"), Expr::number(1.0))]),
                        Expr::call("fib", vec![Expr::minus(Expr::var("x"), Expr::number(2.0))])))),
        ])).unwrap();
        assert_eq!(run(&engine, "fib", &[10.0]), Ok(55.0));
    }

    #[test]
    fn call_depth() {
        let mut engine = Engine::new(16);
        engine.add_module(module_of(vec![
            def("forever", vec!["x"], Expr::call("forever", vec![Expr::var("x")])),
        ])).unwrap();
        assert_eq!(
            run(&engine, "forever", &[1.0]),
            Err(EngineError::CallStackExhausted("forever".to_string())));
    }

    #[test]
    fn deep_recursion() {
        // down(n) = if n < 1 then 0 else down(n-1)
        let down = def("down", vec!["n"],
            Expr::cond(
                Expr::less(Expr::var("n"), Expr::number(1.0)),
                Expr::number(0.0),
                Expr::call("down", vec![Expr::minus(Expr::var("n"), Expr::number(1.0))])));

        let mut engine = Engine::new(20000);
        engine.add_module(module_of(vec![down.clone()])).unwrap();
        assert_eq!(run(&engine, "down", &[10000.0]), Ok(0.0));

        let mut engine = Engine::new(10000);
        engine.add_module(module_of(vec![down])).unwrap();
        assert_eq!(
            run(&engine, "down", &[20000.0]),
            Err(EngineError::CallStackExhausted("down".to_string())));
        assert_eq!(run(&engine, "down", &[100.0]), Ok(0.0));
    }

    #[test]
    fn results_flow_back_to_callers() {
        let mut engine = Engine::default();
        engine.add_module(module_of(vec![
            def("sq", vec!["x"], Expr::times(Expr::var("x"), Expr::var("x"))),
            def("sum_sq", vec!["a", "b"],
                Expr::plus(
                    Expr::call("sq", vec![Expr::var("a")]),
                    Expr::call("sq", vec![Expr::var("b")]))),
        ])).unwrap();
        assert_eq!(run(&engine, "sum_sq", &[3.0, 4.0]), Ok(25.0));
    }

    #[test]
    fn tracked_modules() {
        let mut engine = Engine::default();
        engine.add_module(module_of(vec![def("k", vec![], Expr::number(1.0))])).unwrap();

        let tracker = engine.create_resource_tracker();
        engine.add_module_tracked(module_of(vec![def("k", vec![], Expr::number(2.0))]), &tracker).unwrap();
        assert_eq!(run(&engine, "k", &[]), Ok(2.0));

        assert_eq!(engine.remove(tracker), 1);
        assert_eq!(run(&engine, "k", &[]), Ok(1.0));

        let again = engine.create_resource_tracker();
        engine.add_module_tracked(module_of(vec![def("t", vec![], Expr::number(3.0))]), &again).unwrap();
        assert_eq!(run(&engine, "t", &[]), Ok(3.0));
        engine.remove(again);
        assert_eq!(run(&engine, "t", &[]), Err(EngineError::SymbolNotFound("t".to_string())));
    }

    #[test]
    fn late_binding() {
        // g calls f before f exists; the call resolves once f is added
        let mut engine = Engine::default();
        let mut signatures = Signatures::new();
        signatures.insert("f".to_string(), Prototype::new("f", vec![]));

        let mut module = Module::new("g");
        lower_function(&mut module, &mut signatures, &def("g", vec![], Expr::call("f", vec![]))).unwrap();
        engine.add_module(module).unwrap();
        assert_eq!(run(&engine, "g", &[]), Err(EngineError::SymbolNotFound("f".to_string())));

        let mut module = Module::new("f");
        lower_function(&mut module, &mut signatures, &def("f", vec![], Expr::number(7.0))).unwrap();
        engine.add_module(module).unwrap();
        assert_eq!(run(&engine, "g", &[]), Ok(7.0));
    }

    #[test]
    fn host_functions() {
        let mut engine = Engine::with_runtime(8);
        let mut module = Module::new("test");
        let mut signatures = Signatures::new();
        signatures.insert("printd".to_string(), Prototype::new("printd", vec!["x"]));
        lower_function(&mut module, &mut signatures,
            &def("p", vec![], Expr::call("printd", vec![Expr::number(1.0)]))).unwrap();

        engine.add_module(module).unwrap();
        assert_eq!(run(&engine, "p", &[]), Ok(0.0));
    }

    #[test]
    fn host_arity() {
        let mut engine = Engine::with_runtime(8);
        let mut module = Module::new("test");
        let mut signatures = Signatures::new();
        signatures.insert("putchard".to_string(), Prototype::new("putchard", vec!["a", "b"]));
        lower_function(&mut module, &mut signatures,
            &def("p", vec![], Expr::call("putchard", vec![Expr::number(1.0), Expr::number(2.0)]))).unwrap();

        engine.add_module(module).unwrap();
        assert_eq!(run(&engine, "p", &[]), Err(EngineError::ArgumentCount {
            name: "putchard".to_string(),
            expected: 1,
            got: 2,
        }));
    }

    #[test]
    fn unterminated_block() {
        let mut b = FunctionBuilder::new(Function::declaration("open", vec![]));
        b.build_const(1.0);
        let code = Rc::new(CompiledFunction::new(b.finish()));

        let engine = Engine::default();
        assert_eq!(engine.call(&code, &[]), Err(EngineError::Unterminated {
            function: "open".to_string(),
            block: "entry0".to_string(),
        }));
    }

    #[test]
    fn rejects_ill_formed() {
        let mut b = FunctionBuilder::new(Function::declaration("bad", vec![]));
        b.build_ret(42);
        let mut module = Module::new("test");
        module.add_function(b.finish()).unwrap();

        let mut engine = Engine::default();
        assert!(matches!(engine.add_module(module), Err(EngineError::Verification(_))));
        assert!(!engine.contains("bad"));
    }

    #[test]
    fn rejects_duplicate_bodies() {
        let mut module = module_of(vec![def("d", vec![], Expr::number(1.0))]);
        let copy = module.functions[0].clone();
        module.functions.push(copy);

        let mut engine = Engine::default();
        assert_eq!(engine.add_module(module), Err(EngineError::Redefinition("d".to_string())));
    }
}
