// Operation enums and their gradient functions
pub mod binary;
pub mod conv;
pub mod matmul;
pub mod movement;
pub mod pool;
pub mod reduce;
pub mod unary;

pub use binary::{BinaryGradFn, BinaryOp};
pub use conv::{Padding, Window2d};
pub use matmul::MatMulGradFn;
pub use movement::{MovementGradFn, MovementOp};
pub use reduce::{ReduceGradFn, ReduceOp};
pub use unary::{UnaryGradFn, UnaryOp};
