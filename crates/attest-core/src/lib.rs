pub mod ast;
pub mod error;
pub mod id;
pub mod parser;
pub mod render;
pub mod types;
pub mod visit;

// Re-export commonly used types
pub use ast::{
    ArithOp, Attribute, Block, BoolOp, CmpOp, Expr, ExprKind, FunctionDecl, Literal, Param,
    RecordDecl, SourceModule, Span, Stmt, StmtKind, UnaryOp,
};
pub use error::CoreError;
pub use id::FunctionId;
pub use parser::{parse_expr, parse_module, parse_type};
pub use types::{RecordDef, TypeDesc, TypeEnv, TypeKind};
