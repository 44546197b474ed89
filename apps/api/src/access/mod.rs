//! Paid access: the signed token, the cookie that carries it, and the
//! extractor that guards paid routes.

pub mod clock;
pub mod codec;
pub mod cookie;
pub mod extractor;
pub mod handlers;
