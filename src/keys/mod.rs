//! 键派生模块
//!
//! 包含键模板引擎和表名/键校验。

pub mod template;
pub mod validator;

pub use template::{
    desc_ticks, resolve, ticks, KeyContext, KeyTemplate, Token, DEFAULT_PARTITION_KEY_TEMPLATE,
    DEFAULT_ROW_KEY_TEMPLATE, MAX_TICKS,
};
pub use validator::{validate_key, TableNameValidator};
