//! # Gatewayエンドポイント
//!
//! 任意パスへの GET / HEAD を1つのハンドラで受ける。

pub mod object;

pub use object::handle_object;
