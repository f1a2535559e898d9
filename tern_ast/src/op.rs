use std::fmt;

/// Operator spellings. The textual spelling doubles as the function name
/// used for overload resolution against the built-in module.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Operator {
    // two-character and longer spellings
    R2L,
    P2R,
    AddAssign,
    SubAssign,
    DivAssign,
    MulAssign,
    ModAssign,
    EqEq,
    LessEq,
    GreaterEq,
    NotEq,
    BinNotEq,
    AndAssign,
    OrAssign,
    XorAssign,
    Inc,
    Dec,
    PostInc,
    PostDec,

    // single-character spellings
    At,
    Dot,
    Add,
    Sub,
    Div,
    Mul,
    Mod,
    Assign,
    Is,
    BoolNot,
    BinNot,
    Less,
    Greater,
    BinAnd,
    BinOr,
    BinXor,
}

impl Operator {
    pub fn spelling(self) -> &'static str {
        match self {
            Operator::R2L => "=>",
            Operator::P2R => "->",
            Operator::AddAssign => "+=",
            Operator::SubAssign => "-=",
            Operator::DivAssign => "/=",
            Operator::MulAssign => "*=",
            Operator::ModAssign => "%=",
            Operator::EqEq => "==",
            Operator::LessEq => "<=",
            Operator::GreaterEq => ">=",
            Operator::NotEq => "!=",
            Operator::BinNotEq => "~=",
            Operator::AndAssign => "&=",
            Operator::OrAssign => "|=",
            Operator::XorAssign => "^=",
            Operator::Inc => "++",
            Operator::Dec => "--",
            Operator::PostInc => "+++",
            Operator::PostDec => "---",
            Operator::At => "@",
            Operator::Dot => ".",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Div => "/",
            Operator::Mul => "*",
            Operator::Mod => "%",
            Operator::Assign => "=",
            Operator::Is => "?",
            Operator::BoolNot => "!",
            Operator::BinNot => "~",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::BinAnd => "&",
            Operator::BinOr => "|",
            Operator::BinXor => "^",
        }
    }

    pub fn is_unary(self) -> bool {
        match self {
            Operator::Add
            | Operator::Sub
            | Operator::BoolNot
            | Operator::BinNot
            | Operator::Inc
            | Operator::Dec
            | Operator::PostInc
            | Operator::PostDec => true,

            _ => false,
        }
    }

    /// True for the operators that take two operands. `@` and `.` are
    /// excluded: index and field access have their own node shapes and
    /// never reach operator dispatch.
    pub fn is_binary(self) -> bool {
        match self {
            Operator::Add
            | Operator::Sub
            | Operator::Mul
            | Operator::Div
            | Operator::Mod
            | Operator::Assign
            | Operator::EqEq
            | Operator::NotEq
            | Operator::Less
            | Operator::LessEq
            | Operator::Greater
            | Operator::GreaterEq
            | Operator::BinAnd
            | Operator::BinOr
            | Operator::BinXor
            | Operator::BinNotEq
            | Operator::AddAssign
            | Operator::SubAssign
            | Operator::MulAssign
            | Operator::DivAssign
            | Operator::ModAssign
            | Operator::AndAssign
            | Operator::OrAssign
            | Operator::XorAssign
            | Operator::R2L
            | Operator::P2R => true,

            _ => false,
        }
    }

    pub fn is_ternary(self) -> bool {
        self == Operator::Is
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.spelling())
    }
}
