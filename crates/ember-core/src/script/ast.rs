//! Syntax tree produced by the parser. Every node records its source line.

use std::rc::Rc;

/// Deepest nesting of statements and expressions a chunk may use
pub const MAX_SYNTAX_LEVELS: u32 = 200;

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Local {
        names: Vec<Rc<str>>,
        values: Vec<Expr>,
    },
    LocalFunction {
        name: Rc<str>,
        body: FuncBody,
    },
    Assign {
        targets: Vec<Expr>,
        values: Vec<Expr>,
    },
    /// A call evaluated for its side effects
    Call(Expr),
    /// `function a.b.c()` or `function a.b:m()`
    Function {
        path: Vec<Rc<str>>,
        method: Option<Rc<str>>,
        body: FuncBody,
    },
    If {
        arms: Vec<(Expr, Block)>,
        otherwise: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Repeat {
        body: Block,
        cond: Expr,
    },
    NumericFor {
        var: Rc<str>,
        start: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Block,
    },
    GenericFor {
        names: Vec<Rc<str>>,
        values: Vec<Expr>,
        body: Block,
    },
    Do(Block),
    Return(Vec<Expr>),
    Break,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: u32,
}

impl Expr {
    /// Calls may produce any number of values
    pub fn is_multi(&self) -> bool {
        matches!(self.kind, ExprKind::Call { .. } | ExprKind::Method { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Nil,
    True,
    False,
    Integer(i64),
    Float(f64),
    Str(Rc<str>),
    Function(Box<FuncBody>),
    Table(Vec<Field>),
    Name(Rc<str>),
    Index {
        obj: Box<Expr>,
        key: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Method {
        obj: Box<Expr>,
        name: Rc<str>,
        args: Vec<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    /// Parenthesized expression; truncates a call to one value
    Paren(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Positional(Expr),
    Named(Rc<str>, Expr),
    Keyed(Expr, Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncBody {
    pub name: String,
    pub params: Vec<Rc<str>>,
    pub body: Block,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Lt,
    Gt,
    Le,
    Ge,
    Ne,
    Eq,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
}

impl BinOp {
    /// Left and right binding power
    pub fn precedence(self) -> (u8, u8) {
        match self {
            BinOp::Or => (1, 1),
            BinOp::And => (2, 2),
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Ne | BinOp::Eq => (3, 3),
            BinOp::Concat => (9, 8),
            BinOp::Add | BinOp::Sub => (10, 10),
            BinOp::Mul | BinOp::Div | BinOp::IDiv | BinOp::Mod => (11, 11),
            BinOp::Pow => (14, 13),
        }
    }
}

/// Binding power of unary operators
pub const UNARY_PRECEDENCE: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Len,
}
