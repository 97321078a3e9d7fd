use std::collections::HashMap;

use crate::ssa::{BinOp, BlockExit, BlockId, Function, Module, Op, Predicate, Register};


/// Formats a double the way LLVM assembly does (`1.000000e+00`).
fn fmt_double(x: f64) -> String {
    if !x.is_finite() {
        return format!("0x{:016X}", x.to_bits());
    }
    let s = format!("{:.6e}", x);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            format!("{}e{:+03}", mantissa, exp)
        }
        None => s,
    }
}

struct Names<'a> {
    function: &'a Function,
    constants: HashMap<Register, f64>,
}

impl<'a> Names<'a> {
    fn new(function: &'a Function) -> Names<'a> {
        let constants = function.blocks.iter()
            .flat_map(|b| b.ops.iter())
            .filter_map(|op| match op {
                Op::Const { dst, value } => Some((*dst, *value)),
                _ => None,
            })
            .collect();
        Names { function, constants }
    }

    fn value(&self, r: Register) -> String {
        if let Some(x) = self.constants.get(&r) {
            fmt_double(*x)
        } else if (r as usize) < self.function.arity() {
            format!("%{}", self.function.params[r as usize])
        } else {
            format!("%{}", r)
        }
    }

    fn label(&self, id: BlockId) -> String {
        let label = &self.function.blocks[id].label;
        if label == "entry" {
            label.clone()
        } else {
            format!("{}{}", label, id)
        }
    }
}

fn signature(function: &Function) -> String {
    let params = function.params.iter()
        .map(|p| format!("double %{}", p))
        .collect::<Vec<_>>()
        .join(", ");
    format!("double @{}({})", function.name, params)
}

pub fn emit_function_ir(function: &Function, out: &mut String) {
    if function.is_declaration() {
        out.push_str(&format!("declare {}\n", signature(function)));
        return;
    }

    let names = Names::new(function);

    out.push_str(&format!("define {} {{\n", signature(function)));

    for (i, &block_id) in function.layout.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("{}:\n", names.label(block_id)));

        let block = function.block(block_id);
        for op in &block.ops {
            match op {
                Op::Const { .. } => {}
                Op::Binary { dst, left, right, operator } => {
                    let op_str = match operator {
                        BinOp::Add => "fadd",
                        BinOp::Sub => "fsub",
                        BinOp::Mul => "fmul",
                        BinOp::Div => "fdiv",
                    };
                    out.push_str(&format!(
                        "  %{} = {} double {}, {}\n",
                        dst, op_str, names.value(*left), names.value(*right)));
                }
                Op::Compare { dst, left, right, predicate } => {
                    let pred_str = match predicate {
                        Predicate::Ult => "ult",
                        Predicate::One => "one",
                    };
                    out.push_str(&format!(
                        "  %{} = fcmp {} double {}, {}\n",
                        dst, pred_str, names.value(*left), names.value(*right)));
                }
                Op::UIToFP { dst, src } => {
                    out.push_str(&format!(
                        "  %{} = uitofp i1 {} to double\n",
                        dst, names.value(*src)));
                }
                Op::Phi { dst, incoming } => {
                    let incoming_str = incoming.iter()
                        .map(|(r, b)| format!("[ {}, %{} ]", names.value(*r), names.label(*b)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    out.push_str(&format!("  %{} = phi double {}\n", dst, incoming_str));
                }
                Op::Call { dst, function, args } => {
                    let args_str = args.iter()
                        .map(|r| format!("double {}", names.value(*r)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    out.push_str(&format!(
                        "  %{} = call double @{}({})\n",
                        dst, function, args_str));
                }
            }
        }

        match block.exit {
            Some(BlockExit::Return(r)) => {
                out.push_str(&format!("  ret double {}\n", names.value(r)));
            }
            Some(BlockExit::UnconditionalJump(target)) => {
                out.push_str(&format!("  br label %{}\n", names.label(target)));
            }
            Some(BlockExit::Branch(r, positive, negative)) => {
                out.push_str(&format!(
                    "  br i1 {}, label %{}, label %{}\n",
                    names.value(r), names.label(positive), names.label(negative)));
            }
            None => {}
        }
    }

    out.push_str("}\n");
}

pub fn function_to_string(function: &Function) -> String {
    let mut out = String::new();
    emit_function_ir(function, &mut out);
    out
}

pub fn emit_ir(module: &Module, out: &mut String) {
    out.push_str(&format!("; ModuleID = '{}'\n", module.name));
    out.push_str(&format!("source_filename = \"{}\"\n", module.name));

    for function in &module.functions {
        out.push('\n');
        emit_function_ir(function, out);
    }
}

pub fn module_to_string(module: &Module) -> String {
    let mut out = String::new();
    emit_ir(module, &mut out);
    out
}
