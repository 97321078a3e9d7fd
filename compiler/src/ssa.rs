use std::collections::{HashMap, HashSet};

use crate::error::VerifyError;


pub type Register = u32;
pub type BlockId = usize;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Predicate {
    /// unordered or less than
    Ult,
    /// ordered and not equal
    One,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Op {
    Const { dst: Register, value: f64 },
    Binary { dst: Register, left: Register, right: Register, operator: BinOp },
    Compare { dst: Register, left: Register, right: Register, predicate: Predicate },
    UIToFP { dst: Register, src: Register },
    Phi { dst: Register, incoming: Vec<(Register, BlockId)> },
    Call { dst: Register, function: String, args: Vec<Register> },
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BlockExit {
    Return(Register),
    UnconditionalJump(BlockId),
    Branch(Register, BlockId, BlockId),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Block {
    pub label: String,
    pub ops: Vec<Op>,
    pub exit: Option<BlockExit>,
}

/// A function declaration, or a definition once it has blocks laid out.
/// Registers `0..arity` hold the arguments.
#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub blocks: Vec<Block>,
    /// Blocks inserted into the body, in order; the first is the entry.
    pub layout: Vec<BlockId>,
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
}

impl Op {
    pub fn dst(&self) -> Register {
        match self {
            Self::Const { dst, .. } => *dst,
            Self::Binary { dst, .. } => *dst,
            Self::Compare { dst, .. } => *dst,
            Self::UIToFP { dst, .. } => *dst,
            Self::Phi { dst, .. } => *dst,
            Self::Call { dst, .. } => *dst,
        }
    }

    pub fn uses(&self) -> Vec<Register> {
        match self {
            Self::Const { .. } => vec![],
            Self::Binary { left, right, .. } => vec![*left, *right],
            Self::Compare { left, right, .. } => vec![*left, *right],
            Self::UIToFP { src, .. } => vec![*src],
            Self::Phi { incoming, .. } => incoming.iter().map(|(r, _)| *r).collect(),
            Self::Call { args, .. } => args.clone(),
        }
    }
}

impl BlockExit {
    pub fn successors(&self) -> Vec<BlockId> {
        match *self {
            BlockExit::Return(_) => vec![],
            BlockExit::UnconditionalJump(b) => vec![b],
            BlockExit::Branch(_, t, f) => vec![t, f],
        }
    }
}

impl Block {
    fn new(label: &str) -> Block {
        Block {
            label: label.to_string(),
            ops: Vec::new(),
            exit: None,
        }
    }
}

impl Function {
    pub fn declaration(name: &str, params: Vec<String>) -> Function {
        Function {
            name: name.to_string(),
            params,
            blocks: Vec::new(),
            layout: Vec::new(),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn is_declaration(&self) -> bool {
        self.layout.is_empty()
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.layout.first().copied()
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    /// Names of every function this one calls, in order of first use.
    #[cfg(test)]
    pub fn callees(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for &id in &self.layout {
            for op in &self.blocks[id].ops {
                if let Op::Call { function, .. } = op {
                    if seen.insert(function.as_str()) {
                        names.push(function.as_str());
                    }
                }
            }
        }
        names
    }
}

impl Module {
    pub fn new(name: &str) -> Module {
        Module { name: name.to_string(), functions: Vec::new() }
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Declares `name` unless the module already has a function by that name.
    pub fn declare(&mut self, name: &str, params: &[String]) -> &Function {
        let idx = match self.functions.iter().position(|f| f.name == name) {
            Some(idx) => idx,
            None => {
                self.functions.push(Function::declaration(name, params.to_vec()));
                self.functions.len() - 1
            }
        };
        &self.functions[idx]
    }

    pub fn remove_function(&mut self, name: &str) -> Option<Function> {
        let idx = self.functions.iter().position(|f| f.name == name)?;
        Some(self.functions.remove(idx))
    }

    /// Adds `function`, replacing a declaration of the same name. Fails
    /// when the module already holds a body for that name.
    pub fn add_function(&mut self, function: Function) -> Result<(), Function> {
        match self.functions.iter().position(|f| f.name == function.name) {
            Some(idx) if !self.functions[idx].is_declaration() => Err(function),
            Some(idx) => {
                self.functions[idx] = function;
                Ok(())
            }
            None => {
                self.functions.push(function);
                Ok(())
            }
        }
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().filter(|f| !f.is_declaration())
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}


/// Appends ops to the block at the insertion point of a function under
/// construction.
pub struct FunctionBuilder {
    function: Function,
    current: BlockId,
    register_counter: Register,
}

impl FunctionBuilder {
    /// Starts a body for `declaration`, inserting and entering an
    /// "entry" block.
    pub fn new(declaration: Function) -> FunctionBuilder {
        let register_counter = declaration.arity() as Register;
        let mut builder = FunctionBuilder {
            function: Function { blocks: Vec::new(), layout: Vec::new(), ..declaration },
            current: 0,
            register_counter,
        };
        let entry = builder.append_block("entry");
        builder.position_at_end(entry);
        builder
    }

    #[cfg(test)]
    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn finish(self) -> Function {
        self.function
    }

    pub fn fresh_register(&mut self) -> Register {
        let r = self.register_counter;
        self.register_counter += 1;
        r
    }

    /// Creates a block that is not yet part of the body.
    pub fn create_block(&mut self, label: &str) -> BlockId {
        self.function.blocks.push(Block::new(label));
        self.function.blocks.len() - 1
    }

    pub fn insert_block(&mut self, id: BlockId) {
        self.function.layout.push(id);
    }

    pub fn append_block(&mut self, label: &str) -> BlockId {
        let id = self.create_block(label);
        self.insert_block(id);
        id
    }

    pub fn position_at_end(&mut self, id: BlockId) {
        self.current = id;
    }

    pub fn current_block_id(&self) -> BlockId {
        self.current
    }

    fn current_block_mut(&mut self) -> &mut Block {
        &mut self.function.blocks[self.current]
    }

    fn push_op(&mut self, op: Op) -> Register {
        let dst = op.dst();
        self.current_block_mut().ops.push(op);
        dst
    }

    pub fn build_const(&mut self, value: f64) -> Register {
        let dst = self.fresh_register();
        self.push_op(Op::Const { dst, value })
    }

    pub fn build_binary(&mut self, operator: BinOp, left: Register, right: Register) -> Register {
        let dst = self.fresh_register();
        self.push_op(Op::Binary { dst, left, right, operator })
    }

    pub fn build_compare(&mut self, predicate: Predicate, left: Register, right: Register) -> Register {
        let dst = self.fresh_register();
        self.push_op(Op::Compare { dst, left, right, predicate })
    }

    pub fn build_uitofp(&mut self, src: Register) -> Register {
        let dst = self.fresh_register();
        self.push_op(Op::UIToFP { dst, src })
    }

    pub fn build_call(&mut self, function: &str, args: Vec<Register>) -> Register {
        let dst = self.fresh_register();
        self.push_op(Op::Call { dst, function: function.to_string(), args })
    }

    pub fn build_phi(&mut self, incoming: Vec<(Register, BlockId)>) -> Register {
        let dst = self.fresh_register();
        self.push_op(Op::Phi { dst, incoming })
    }

    /// Adds an incoming edge to the phi defining `phi`.
    pub fn add_incoming(&mut self, phi: Register, value: Register, block: BlockId) {
        for block_ in self.function.blocks.iter_mut() {
            for op in block_.ops.iter_mut() {
                if let Op::Phi { dst, incoming } = op {
                    if *dst == phi {
                        incoming.push((value, block));
                        return;
                    }
                }
            }
        }
    }

    fn terminate(&mut self, exit: BlockExit) {
        let block = self.current_block_mut();
        if block.exit.is_none() {
            block.exit = Some(exit);
        }
    }

    pub fn build_br(&mut self, target: BlockId) {
        self.terminate(BlockExit::UnconditionalJump(target));
    }

    pub fn build_cond_br(&mut self, cond: Register, then_block: BlockId, else_block: BlockId) {
        self.terminate(BlockExit::Branch(cond, then_block, else_block));
    }

    pub fn build_ret(&mut self, value: Register) {
        self.terminate(BlockExit::Return(value));
    }
}


#[derive(Debug, PartialEq, Clone, Copy)]
enum Ty {
    Double,
    Bool,
}

/// Checks that `function` is well formed: terminated blocks, branch
/// targets inside the body, phis leading their block with one entry per
/// predecessor, and every used register defined once with the right type.
pub fn verify_function(function: &Function) -> Result<(), VerifyError> {
    let fail = |reason: String| Err(VerifyError { function: function.name.clone(), reason });

    if function.is_declaration() {
        return Ok(());
    }

    let mut inserted = HashSet::new();
    for &id in &function.layout {
        if id >= function.blocks.len() || !inserted.insert(id) {
            return fail(format!("block {} is not a valid block of the body", id));
        }
    }

    let mut predecessors: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
    for &id in &function.layout {
        let block = &function.blocks[id];
        let exit = match block.exit {
            Some(exit) => exit,
            None => return fail(format!("block {}{} has no terminator", block.label, id)),
        };
        for succ in exit.successors() {
            if !inserted.contains(&succ) {
                return fail(format!("branch to block {} outside of the body", succ));
            }
            predecessors.entry(succ).or_default().insert(id);
        }
    }
    if let Some(entry) = function.entry() {
        if predecessors.contains_key(&entry) {
            return fail("entry block has predecessors".to_string());
        }
    }

    let mut types: HashMap<Register, Ty> = (0..function.arity() as Register)
        .map(|r| (r, Ty::Double))
        .collect();
    for &id in &function.layout {
        for op in &function.blocks[id].ops {
            let ty = match op {
                Op::Compare { .. } => Ty::Bool,
                _ => Ty::Double,
            };
            if types.insert(op.dst(), ty).is_some() {
                return fail(format!("register %{} is defined more than once", op.dst()));
            }
        }
    }

    let expect = |r: Register, ty: Ty| -> Result<(), VerifyError> {
        match types.get(&r) {
            None => fail(format!("use of undefined register %{}", r)),
            Some(&t) if t != ty => fail(format!("register %{} has type {:?}, expected {:?}", r, t, ty)),
            Some(_) => Ok(()),
        }
    };

    for &id in &function.layout {
        let block = &function.blocks[id];
        let mut past_phis = false;

        for op in &block.ops {
            match op {
                Op::Phi { incoming, .. } => {
                    if past_phis {
                        return fail(format!("phi %{} is not at the start of its block", op.dst()));
                    }
                    let sources: Vec<BlockId> = incoming.iter().map(|(_, b)| *b).collect();
                    let unique: HashSet<BlockId> = sources.iter().copied().collect();
                    let empty = HashSet::new();
                    let preds = predecessors.get(&id).unwrap_or(&empty);
                    if unique.len() != sources.len() || &unique != preds {
                        return fail(format!(
                            "phi %{} does not have one entry per predecessor of {}{}",
                            op.dst(), block.label, id));
                    }
                }
                _ => past_phis = true,
            }

            let operand_ty = match op {
                Op::UIToFP { .. } => Ty::Bool,
                _ => Ty::Double,
            };
            for r in op.uses() {
                expect(r, operand_ty)?;
            }
        }

        match block.exit {
            Some(BlockExit::Return(r)) => expect(r, Ty::Double)?,
            Some(BlockExit::Branch(r, _, _)) => expect(r, Ty::Bool)?,
            _ => {}
        }
    }

    Ok(())
}


#[cfg(test)]
mod test {
    use super::{BinOp, Block, BlockExit, Function, FunctionBuilder, Module, Op, Predicate, verify_function};

    fn decl(name: &str, params: Vec<&str>) -> Function {
        Function::declaration(name, params.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn simple() {
        let mut b = FunctionBuilder::new(decl("foo", vec!["x"]));
        let one = b.build_const(1.0);
        let sum = b.build_binary(BinOp::Add, one, 0);
        b.build_ret(sum);
        let f = b.finish();

        assert_eq!(f.layout, vec![0]);
        assert_eq!(f.blocks, vec![
            Block {
                label: "entry".to_string(),
                ops: vec![
                    Op::Const { dst: 1, value: 1.0 },
                    Op::Binary { dst: 2, left: 1, right: 0, operator: BinOp::Add },
                ],
                exit: Some(BlockExit::Return(2)),
            }
        ]);
        assert_eq!(verify_function(&f), Ok(()));
    }

    fn diamond() -> Function {
        let mut b = FunctionBuilder::new(decl("diamond", vec!["x"]));
        let zero = b.build_const(0.0);
        let cond = b.build_compare(Predicate::One, 0, zero);
        let then_block = b.append_block("then");
        let else_block = b.create_block("else");
        let merge_block = b.create_block("ifcont");
        b.build_cond_br(cond, then_block, else_block);

        b.position_at_end(then_block);
        let one = b.build_const(1.0);
        b.build_br(merge_block);

        b.insert_block(else_block);
        b.position_at_end(else_block);
        let two = b.build_const(2.0);
        b.build_br(merge_block);

        b.insert_block(merge_block);
        b.position_at_end(merge_block);
        let phi = b.build_phi(vec![(one, then_block), (two, else_block)]);
        b.build_ret(phi);
        b.finish()
    }

    #[test]
    fn well_formed_diamond() {
        let f = diamond();
        assert_eq!(f.layout, vec![0, 1, 2, 3]);
        assert_eq!(verify_function(&f), Ok(()));
    }

    #[test]
    fn missing_terminator() {
        let mut f = diamond();
        f.blocks[1].exit = None;
        assert!(verify_function(&f).unwrap_err().reason.contains("no terminator"));
    }

    #[test]
    fn phi_from_wrong_block() {
        let mut f = diamond();
        if let Op::Phi { incoming, .. } = &mut f.blocks[3].ops[0] {
            incoming[0].1 = 0;
        }
        assert!(verify_function(&f).unwrap_err().reason.contains("one entry per predecessor"));
    }

    #[test]
    fn phi_after_other_ops() {
        let mut f = diamond();
        f.blocks[3].ops.insert(0, Op::Const { dst: 99, value: 0.0 });
        assert!(verify_function(&f).unwrap_err().reason.contains("is not at the start of its block"));
    }

    #[test]
    fn register_defined_twice() {
        let mut b = FunctionBuilder::new(decl("twice", vec!["x"]));
        let one = b.build_const(1.0);
        b.build_ret(one);
        let mut f = b.finish();
        f.blocks[0].ops.push(Op::Const { dst: one, value: 2.0 });
        assert_eq!(
            verify_function(&f).unwrap_err().reason,
            "register %1 is defined more than once");
    }

    #[test]
    fn jump_back_to_entry() {
        let mut b = FunctionBuilder::new(decl("spin", vec![]));
        let next = b.append_block("next");
        b.build_br(next);
        b.position_at_end(next);
        b.build_br(0);
        assert_eq!(
            verify_function(&b.finish()).unwrap_err().reason,
            "entry block has predecessors");
    }

    #[test]
    fn branch_on_double() {
        let mut b = FunctionBuilder::new(decl("bad", vec!["x"]));
        let next = b.append_block("next");
        b.build_cond_br(0, next, next);
        b.position_at_end(next);
        b.build_ret(0);
        let err = verify_function(&b.finish()).unwrap_err();
        assert!(err.reason.contains("expected Bool"));
    }

    #[test]
    fn branch_outside_body() {
        let mut b = FunctionBuilder::new(decl("bad", vec![]));
        let detached = b.create_block("detached");
        b.build_br(detached);
        let err = verify_function(&b.finish()).unwrap_err();
        assert!(err.reason.contains("outside of the body"));
    }

    #[test]
    fn undefined_register() {
        let mut b = FunctionBuilder::new(decl("bad", vec![]));
        b.build_ret(7);
        let err = verify_function(&b.finish()).unwrap_err();
        assert_eq!(err.reason, "use of undefined register %7");
    }

    #[test]
    fn terminator_is_set_once() {
        let mut b = FunctionBuilder::new(decl("f", vec!["x"]));
        b.build_ret(0);
        b.build_br(0);
        assert_eq!(b.function().blocks[0].exit, Some(BlockExit::Return(0)));
    }

    #[test]
    fn module_functions() {
        let mut m = Module::new("test");
        m.declare("f", &["a".to_string()]);
        m.declare("f", &[]);
        assert_eq!(m.functions.len(), 1);
        assert_eq!(m.get_function("f").unwrap().arity(), 1);

        assert!(m.add_function(diamond()).is_ok());
        assert!(m.add_function(diamond()).is_err());
        assert_eq!(m.definitions().count(), 1);

        assert!(m.remove_function("f").is_some());
        assert!(m.remove_function("f").is_none());
    }

    #[test]
    fn callees() {
        let mut b = FunctionBuilder::new(decl("f", vec!["x"]));
        let a = b.build_call("g", vec![0]);
        let c = b.build_call("h", vec![a]);
        let d = b.build_call("g", vec![c]);
        b.build_ret(d);
        assert_eq!(b.finish().callees(), vec!["g", "h"]);
    }
}
