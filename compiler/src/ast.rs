#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    Number(f64),
    Var(String),
    BinOp(char, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    For {
        var: String,
        start: Box<Expr>,
        end: Box<Expr>,
        step: Option<Box<Expr>>,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn number(x: f64) -> Expr {
        Expr::Number(x)
    }
    pub fn var(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }
    pub fn binop(op: char, l: Expr, r: Expr) -> Expr {
        Expr::BinOp(op, Box::new(l), Box::new(r))
    }
    pub fn plus(l: Expr, r: Expr) -> Expr {
        Expr::binop('+', l, r)
    }
    pub fn minus(l: Expr, r: Expr) -> Expr {
        Expr::binop('-', l, r)
    }
    pub fn times(l: Expr, r: Expr) -> Expr {
        Expr::binop('*', l, r)
    }
    pub fn less(l: Expr, r: Expr) -> Expr {
        Expr::binop('<', l, r)
    }
    pub fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::Call(name.to_string(), args)
    }
    pub fn cond(c: Expr, cons: Expr, alt: Expr) -> Expr {
        Expr::If(Box::new(c), Box::new(cons), Box::new(alt))
    }
    pub fn for_loop(var: &str, start: Expr, end: Expr, step: Option<Expr>, body: Expr) -> Expr {
        Expr::For {
            var: var.to_string(),
            start: Box::new(start),
            end: Box::new(end),
            step: step.map(Box::new),
            body: Box::new(body),
        }
    }
}

/// Name and parameter names of a function; arity is the number of params.
#[derive(Debug, PartialEq, Clone)]
pub struct Prototype {
    pub name: String,
    pub params: Vec<String>,
}

impl Prototype {
    pub fn new(name: &str, params: Vec<&str>) -> Prototype {
        Prototype {
            name: name.to_string(),
            params: params.iter().map(|&s| s.to_string()).collect(),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct FunDefinition {
    pub proto: Prototype,
    pub body: Expr,
}

impl FunDefinition {
    pub fn new(proto: Prototype, body: Expr) -> FunDefinition {
        FunDefinition { proto, body }
    }
}
