use std::collections::HashMap;

use crate::ast::{Expr, FunDefinition, Prototype};
use crate::error::LowerError;
use crate::ssa::{BinOp, Function, FunctionBuilder, Module, Predicate, Register, verify_function};


/// Latest prototype seen for every defined or extern'd function name.
pub type Signatures = HashMap<String, Prototype>;

type LowerResult<T> = Result<T, LowerError>;

struct FunctionEnv<'a> {
    builder: FunctionBuilder,
    module: &'a mut Module,
    signatures: &'a Signatures,
    named_values: HashMap<String, Register>,
}

impl<'a> FunctionEnv<'a> {
    /// Arity of `name`, declaring it in the module from its last known
    /// prototype if the module does not have it yet.
    fn resolve_function(&mut self, name: &str) -> Option<usize> {
        if let Some(f) = self.module.get_function(name) {
            return Some(f.arity());
        }
        let proto = self.signatures.get(name)?;
        Some(lower_prototype(self.module, proto).arity())
    }
}

fn lower_expr(e: &Expr, env: &mut FunctionEnv) -> LowerResult<Register> {
    match e {
        Expr::Number(value) => Ok(env.builder.build_const(*value)),

        Expr::Var(name) => env.named_values.get(name)
            .copied()
            .ok_or_else(|| LowerError::UnknownVariable(name.clone())),

        Expr::BinOp(op, l, r) => {
            let left = lower_expr(l, env)?;
            let right = lower_expr(r, env)?;
            let b = &mut env.builder;
            match op {
                '+' => Ok(b.build_binary(BinOp::Add, left, right)),
                '-' => Ok(b.build_binary(BinOp::Sub, left, right)),
                '*' => Ok(b.build_binary(BinOp::Mul, left, right)),
                '/' => Ok(b.build_binary(BinOp::Div, left, right)),
                '<' => {
                    let cmp = b.build_compare(Predicate::Ult, left, right);
                    Ok(b.build_uitofp(cmp))
                }
                _ => Err(LowerError::InvalidOperator(*op)),
            }
        }

        Expr::Call(name, args) => {
            let arity = env.resolve_function(name)
                .ok_or_else(|| LowerError::UnknownFunction(name.clone()))?;
            if arity != args.len() {
                return Err(LowerError::ArgumentCount {
                    name: name.clone(),
                    expected: arity,
                    got: args.len(),
                });
            }

            let mut arg_regs = Vec::new();
            for arg in args {
                arg_regs.push(lower_expr(arg, env)?);
            }
            Ok(env.builder.build_call(name, arg_regs))
        }

        Expr::If(c, cons, alt) => {
            let cond_value = lower_expr(c, env)?;
            let zero = env.builder.build_const(0.0);
            let cond = env.builder.build_compare(Predicate::One, cond_value, zero);

            let then_block = env.builder.append_block("then");
            let else_block = env.builder.create_block("else");
            let merge_block = env.builder.create_block("ifcont");
            env.builder.build_cond_br(cond, then_block, else_block);

            env.builder.position_at_end(then_block);
            let then_value = lower_expr(cons, env)?;
            env.builder.build_br(merge_block);
            // nested control flow may have moved the insertion point
            let then_exit = env.builder.current_block_id();

            env.builder.insert_block(else_block);
            env.builder.position_at_end(else_block);
            let else_value = lower_expr(alt, env)?;
            env.builder.build_br(merge_block);
            let else_exit = env.builder.current_block_id();

            env.builder.insert_block(merge_block);
            env.builder.position_at_end(merge_block);
            Ok(env.builder.build_phi(vec![(then_value, then_exit), (else_value, else_exit)]))
        }

        Expr::For { var, start, end, step, body } => {
            let start_value = lower_expr(start, env)?;

            // a loop whose start already fails the end condition is skipped
            let outer = env.named_values.insert(var.clone(), start_value);
            let entry_end = lower_expr(end, env)?;
            let zero = env.builder.build_const(0.0);
            let entry_cond = env.builder.build_compare(Predicate::One, entry_end, zero);

            let preheader = env.builder.current_block_id();
            let loop_block = env.builder.append_block("loop");
            let after_block = env.builder.create_block("afterloop");
            env.builder.build_cond_br(entry_cond, loop_block, after_block);
            env.builder.position_at_end(loop_block);

            let variable = env.builder.build_phi(vec![(start_value, preheader)]);
            env.named_values.insert(var.clone(), variable);

            lower_expr(body, env)?;

            let step_value = match step {
                Some(step) => lower_expr(step, env)?,
                None => env.builder.build_const(1.0),
            };
            let next = env.builder.build_binary(BinOp::Add, variable, step_value);

            let end_value = lower_expr(end, env)?;
            let zero = env.builder.build_const(0.0);
            let end_cond = env.builder.build_compare(Predicate::One, end_value, zero);

            let loop_end = env.builder.current_block_id();
            env.builder.build_cond_br(end_cond, loop_block, after_block);
            env.builder.insert_block(after_block);
            env.builder.position_at_end(after_block);

            env.builder.add_incoming(variable, next, loop_end);

            match outer {
                Some(outer) => env.named_values.insert(var.clone(), outer),
                None => env.named_values.remove(var),
            };

            Ok(env.builder.build_const(0.0))
        }
    }
}

/// Declares `proto` in `module`; an existing function of the same name is
/// returned as is.
pub fn lower_prototype<'m>(module: &'m mut Module, proto: &Prototype) -> &'m Function {
    module.declare(&proto.name, &proto.params)
}

/// Lowers `def` into a body in `module` and records its prototype in
/// `signatures`. On failure nothing of the function is left in `module`.
pub fn lower_function(
    module: &mut Module,
    signatures: &mut Signatures,
    def: &FunDefinition,
) -> LowerResult<()> {
    let name = &def.proto.name;
    signatures.insert(name.clone(), def.proto.clone());

    if module.get_function(name).map_or(false, |f| !f.is_declaration()) {
        return Err(LowerError::Redefinition(name.clone()));
    }
    module.remove_function(name);

    let declaration = Function::declaration(name, def.proto.params.clone());
    let mut env = FunctionEnv {
        builder: FunctionBuilder::new(declaration),
        module,
        signatures,
        named_values: HashMap::new(),
    };
    for (i, param) in def.proto.params.iter().enumerate() {
        env.named_values.insert(param.clone(), i as Register);
    }

    let result = lower_expr(&def.body, &mut env);
    let FunctionEnv { mut builder, module, .. } = env;
    let ret = match result {
        Ok(ret) => ret,
        Err(e) => {
            module.remove_function(name);
            return Err(e);
        }
    };
    builder.build_ret(ret);
    let function = builder.finish();

    if let Err(e) = verify_function(&function) {
        module.remove_function(name);
        return Err(e.into());
    }

    module.remove_function(name);
    module.add_function(function)
        .map_err(|f| LowerError::Redefinition(f.name))
}
