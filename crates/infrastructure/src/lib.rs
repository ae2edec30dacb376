//! 基础设施层
//!
//! PostgreSQL 仓储实现与模板渲染器。领域和应用层只依赖接口，
//! 这里是把它们接到外部世界的地方。

pub mod db;
pub mod render;

pub use db::{Db, DbPool};
pub use render::TemplateRenderer;
