//! 解析与导出模块入口。
//!
//! 负责目录页/章节页解析、EPUB 打包以及输出文件管理。

pub mod book_manager;
pub mod epub_generator;
pub mod parser;
