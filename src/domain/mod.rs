//! Domain models for order lifecycle management.

mod order;
mod pair;
mod request;

pub use order::{AssetType, OrderDetail, OrderSide, OrderStatus, OrderType};
pub use pair::Pair;
pub use request::{
    CancelRequest, ModifyRequest, ModifyResponse, OrderFilter, OrdersRequest, SubmitRequest,
    SubmitResponse, ValidationError,
};
