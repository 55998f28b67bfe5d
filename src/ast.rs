use crate::value::Value;
use std::rc::Rc;

/// Expression nodes. Literals are folded into [`Value`]s at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Value),
    Ident(String),
    List(Vec<Expr>),
    MapLit(Vec<(Expr, Expr)>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `value if cond else alternative`; a missing alternative yields
    /// Undefined when the condition is false.
    Cond {
        value: Box<Expr>,
        cond: Box<Expr>,
        alternative: Option<Box<Expr>>,
    },
    Member {
        base: Box<Expr>,
        name: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        base: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call {
        callee: Box<Expr>,
        args: CallArgs,
    },
    Filter {
        name: String,
        base: Box<Expr>,
        args: CallArgs,
    },
    Test {
        name: String,
        base: Box<Expr>,
        args: Vec<Expr>,
        negated: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
}

/// Positional and keyword arguments of a call site, in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallArgs {
    pub args: Vec<Expr>,
    pub kwargs: Vec<(String, Expr)>,
}

/// Statement nodes. Bodies that are re-entered after parsing (macros,
/// blocks, loops, call blocks) are reference counted so the evaluator can
/// hold on to them from closures without copying the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Text(String),
    Emit(Expr),
    If {
        cond: Expr,
        body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    For(Rc<ForLoop>),
    Set {
        name: String,
        attr: Option<String>,
        value: Expr,
    },
    With {
        bindings: Vec<(String, Expr)>,
        body: Vec<Stmt>,
    },
    Macro(Rc<MacroDecl>),
    CallBlock(Rc<CallBlock>),
    FilterBlock {
        name: String,
        args: CallArgs,
        body: Vec<Stmt>,
    },
    Block {
        name: String,
        body: Rc<Vec<Stmt>>,
    },
    Extends(Expr),
    Include {
        target: Expr,
        ignore_missing: bool,
    },
    Import {
        target: Expr,
        alias: String,
    },
    FromImport {
        target: Expr,
        names: Vec<(String, Option<String>)>,
    },
    /// Parsed for compatibility; the body renders unchanged.
    Autoescape {
        enabled: Expr,
        body: Vec<Stmt>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub targets: Vec<String>,
    pub iter: Expr,
    pub cond: Option<Expr>,
    pub recursive: bool,
    pub body: Vec<Stmt>,
    pub else_body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDecl {
    pub name: String,
    pub params: Vec<MacroParam>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroParam {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallBlock {
    pub params: Vec<String>,
    pub call: Expr,
    pub body: Vec<Stmt>,
}
