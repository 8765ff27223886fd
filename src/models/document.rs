//! 文档模型：带坐标的文本片段、页面以及逻辑行

use serde::{Deserialize, Serialize};

/// 页面上的一个带坐标文本片段
///
/// `y` 从页面顶部向下递增
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Token {
    pub fn new(text: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            width: 0.0,
            height: 0.0,
        }
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// 空白或单独的 "-" 占位符
    pub fn is_placeholder(&self) -> bool {
        let trimmed = self.text.trim();
        trimmed.is_empty() || trimmed == "-"
    }
}

/// 某个特殊字段在页面上的定位结果，`tokens` 已按 X 排序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub key: String,
    pub tokens: Vec<Token>,
}

impl FieldMatch {
    pub fn joined_text(&self) -> String {
        self.tokens
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 单个页面
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 已剔除纯空白片段
    pub tokens: Vec<Token>,
    pub fields: Vec<FieldMatch>,
}

impl Page {
    pub fn field(&self, key: &str) -> Option<&FieldMatch> {
        self.fields.iter().find(|f| f.key == key)
    }
}

/// 解析后的整份文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub pages: Vec<Page>,
}

impl ParsedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// 纵坐标近似相同的一组片段，按 X 拼接而成
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub y: f64,
    pub text: String,
}
