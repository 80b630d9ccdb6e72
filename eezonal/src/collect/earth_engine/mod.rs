pub mod ee_collect;
pub mod expression;

pub use ee_collect::{AssetInfo, Backend, ClientOptions, EarthEngineClient};
pub use expression::{Expression, ExpressionGraph, ValueNode};
