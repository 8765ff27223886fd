//! 文档解析服务 - 业务能力层
//!
//! 把 PDF 字节解析成带坐标的文本片段，并按特殊字段规则定位字段。
//!
//! ## 实现说明
//! - 使用 `lopdf` 解码页面内容流
//! - 只跟踪文本定位相关的算子（BT/ET、Tm/Td/TD/T*、Tf/TL/Tz/Tc/Tw、q/Q/cm）
//! - 宽度按字符数估算，不读取字体度量
//! - 不展开 Form XObject（`Do`）

use std::sync::Arc;

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use tracing::debug;

use crate::error::{AppResult, ExtractError};
use crate::models::document::{FieldMatch, Page, ParsedDocument, Token};
use crate::models::field::FieldRuleSet;

const DEFAULT_PAGE_TOP: f64 = 792.0;
/// 估算字宽时使用的平均字形宽度（相对字号）
const AVG_GLYPH_WIDTH: f64 = 0.5;
/// TJ 数组中小于该值的间距视为单词间空格
const TJ_SPACE_THRESHOLD: f64 = -100.0;

/// 文档解析器
///
/// 职责：
/// - 解析 PDF 为页面与文本片段
/// - 在每页上定位特殊字段
/// - 不做任何比较
pub struct DocumentExtractor {
    rules: Arc<FieldRuleSet>,
}

impl DocumentExtractor {
    pub fn new(rules: Arc<FieldRuleSet>) -> Self {
        Self { rules }
    }

    /// 解析 PDF 字节
    pub fn extract(&self, bytes: &[u8]) -> AppResult<ParsedDocument> {
        if !has_pdf_header(bytes) {
            return Err(ExtractError::Unsupported.into());
        }

        let doc = Document::load_mem(bytes).map_err(|e| ExtractError::Corrupt(e.to_string()))?;
        let page_ids = doc.get_pages();
        if page_ids.is_empty() {
            return Err(ExtractError::Corrupt("文档没有任何页面".to_string()).into());
        }

        let mut pages = Vec::with_capacity(page_ids.len());
        for (&page_num, &page_id) in page_ids.iter() {
            let raw_tokens = read_page_tokens(&doc, page_num, page_id)?;
            debug!("第 {} 页解析出 {} 个文本片段", page_num, raw_tokens.len());
            pages.push(self.build_page(raw_tokens));
        }

        Ok(ParsedDocument { pages })
    }

    /// 由原始片段（可包含空白片段）构建页面并定位特殊字段
    pub fn build_page(&self, raw_tokens: Vec<Token>) -> Page {
        let fields = self
            .rules
            .fields
            .iter()
            .filter_map(|def| {
                locate_field(&raw_tokens, &def.label).map(|tokens| FieldMatch {
                    key: def.label.clone(),
                    tokens,
                })
            })
            .collect();

        let tokens = raw_tokens.into_iter().filter(|t| !t.is_blank()).collect();

        Page { tokens, fields }
    }
}

/// 按标签定位字段
///
/// 找到第一个包含标签的片段，取与其 Y 完全相同的所有片段，
/// 去掉空白与 "-" 占位符后按 X 排序。未找到时返回 `None`。
pub fn locate_field(tokens: &[Token], label: &str) -> Option<Vec<Token>> {
    let anchor = tokens.iter().find(|t| t.text.contains(label))?;

    let mut same_line: Vec<Token> = tokens
        .iter()
        .filter(|t| t.y == anchor.y && !t.is_placeholder())
        .cloned()
        .collect();

    if same_line.is_empty() {
        return None;
    }

    same_line.sort_by(|a, b| a.x.total_cmp(&b.x));
    Some(same_line)
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(1024)];
    window.windows(4).any(|w| w == b"%PDF")
}

// ========== 内容流解析 ==========

/// 2D 仿射矩阵 [a b c d e f]，行向量约定
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn translation(tx: f64, ty: f64) -> Self {
        Matrix {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    fn from_operands(ops: &[Object]) -> Option<Self> {
        if ops.len() < 6 {
            return None;
        }
        Some(Matrix {
            a: number(&ops[0])?,
            b: number(&ops[1])?,
            c: number(&ops[2])?,
            d: number(&ops[3])?,
            e: number(&ops[4])?,
            f: number(&ops[5])?,
        })
    }

    /// self × other
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn scale_x(&self) -> f64 {
        (self.a * self.a + self.b * self.b).sqrt()
    }

    fn scale_y(&self) -> f64 {
        (self.c * self.c + self.d * self.d).sqrt()
    }
}

/// 文本状态
///
/// 除 `tm`/`tlm` 外都属于图形状态，随 q/Q 一起保存和恢复
#[derive(Debug, Clone)]
struct TextState {
    ctm: Matrix,
    tm: Matrix,
    tlm: Matrix,
    font_size: f64,
    leading: f64,
    horizontal_scale: f64,
    char_spacing: f64,
    word_spacing: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font_size: 12.0,
            leading: 0.0,
            horizontal_scale: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f64, ty: f64) {
        self.tlm = Matrix::translation(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.move_line(0.0, -leading);
    }

    /// 在当前位置输出一个片段，并把文本矩阵推进到片段末尾
    fn show(&mut self, text: String, kerning: f64, page_top: f64) -> Token {
        let glyphs = text.chars().count() as f64;
        let spaces = text.chars().filter(|c| *c == ' ').count() as f64;
        let advance = (glyphs * self.font_size * AVG_GLYPH_WIDTH
            + glyphs * self.char_spacing
            + spaces * self.word_spacing
            - kerning / 1000.0 * self.font_size)
            * self.horizontal_scale;

        let rendering = self.tm.then(&self.ctm);
        let x = rendering.e;
        let y = page_top - rendering.f;
        let width = advance * rendering.scale_x();
        let height = self.font_size * rendering.scale_y();

        self.tm = Matrix::translation(advance, 0.0).then(&self.tm);

        Token::new(text, round3(x), round3(y)).with_size(round3(width.abs()), round3(height.abs()))
    }
}

fn read_page_tokens(doc: &Document, page_num: u32, page_id: ObjectId) -> AppResult<Vec<Token>> {
    let page_top = page_top(doc, page_id);

    let data = doc
        .get_page_content(page_id)
        .map_err(|e| ExtractError::ContentStream {
            page: page_num,
            message: e.to_string(),
        })?;
    let content = Content::decode(&data).map_err(|e| ExtractError::ContentStream {
        page: page_num,
        message: e.to_string(),
    })?;

    let mut tokens = Vec::new();
    let mut state = TextState::default();
    let mut saved: Vec<TextState> = Vec::new();

    for op in content.operations.iter() {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => saved.push(state.clone()),
            "Q" => {
                if let Some(restored) = saved.pop() {
                    state = TextState {
                        tm: state.tm,
                        tlm: state.tlm,
                        ..restored
                    };
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    state.ctm = m.then(&state.ctm);
                }
            }
            "BT" => {
                state.tm = Matrix::IDENTITY;
                state.tlm = Matrix::IDENTITY;
            }
            "ET" => {}
            "Tf" => {
                if let Some(size) = operands.get(1).and_then(number) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(number) {
                    state.leading = leading;
                }
            }
            "Tz" => {
                if let Some(scale) = operands.first().and_then(number) {
                    state.horizontal_scale = scale / 100.0;
                }
            }
            "Tc" => {
                if let Some(v) = operands.first().and_then(number) {
                    state.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = operands.first().and_then(number) {
                    state.word_spacing = v;
                }
            }
            "Td" | "TD" => {
                if let (Some(tx), Some(ty)) = (
                    operands.first().and_then(number),
                    operands.get(1).and_then(number),
                ) {
                    if op.operator == "TD" {
                        state.leading = -ty;
                    }
                    state.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    state.tm = m;
                    state.tlm = m;
                }
            }
            "T*" => state.next_line(),
            "Tj" => {
                if let Some(text) = operands.first().and_then(string_operand) {
                    tokens.push(state.show(text, 0.0, page_top));
                }
            }
            "'" => {
                state.next_line();
                if let Some(text) = operands.first().and_then(string_operand) {
                    tokens.push(state.show(text, 0.0, page_top));
                }
            }
            "\"" => {
                if let Some(v) = operands.first().and_then(number) {
                    state.word_spacing = v;
                }
                if let Some(v) = operands.get(1).and_then(number) {
                    state.char_spacing = v;
                }
                state.next_line();
                if let Some(text) = operands.get(2).and_then(string_operand) {
                    tokens.push(state.show(text, 0.0, page_top));
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let (text, kerning) = flatten_tj(items);
                    tokens.push(state.show(text, kerning, page_top));
                }
            }
            _ => {}
        }
    }

    Ok(tokens)
}

/// 合并 TJ 数组：返回文本以及累计的字距调整（千分之一字号）
fn flatten_tj(items: &[Object]) -> (String, f64) {
    let mut text = String::new();
    let mut kerning = 0.0;
    for item in items {
        match item {
            Object::String(bytes, _) => text.push_str(&decode_pdf_string(bytes)),
            other => {
                if let Some(n) = number(other) {
                    kerning += n;
                    if n < TJ_SPACE_THRESHOLD && !text.ends_with(' ') {
                        text.push(' ');
                    }
                }
            }
        }
    }
    (text, kerning)
}

fn string_operand(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        _ => None,
    }
}

/// 解码 PDF 字符串：带 BOM 的 UTF-16BE → UTF-8 → Latin-1
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        if let Ok(s) = String::from_utf16(&units) {
            return s;
        }
    }
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    bytes.iter().map(|&b| b as char).collect()
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// 读取页面上边缘的 Y，MediaBox 可以从父节点继承
fn page_top(doc: &Document, page_id: ObjectId) -> f64 {
    let mut current = doc.get_dictionary(page_id).ok();
    let mut depth = 0;

    while let Some(dict) = current {
        if let Ok(media_box) = dict.get(b"MediaBox") {
            let array = match media_box {
                Object::Reference(id) => doc.get_object(*id).and_then(|o| o.as_array()),
                other => other.as_array(),
            };
            if let Ok(arr) = array {
                if arr.len() >= 4 {
                    if let (Some(y0), Some(y1)) = (number(&arr[1]), number(&arr[3])) {
                        return y0.max(y1);
                    }
                }
            }
        }

        depth += 1;
        if depth > 32 {
            break;
        }
        current = dict
            .get(b"Parent")
            .and_then(|p| p.as_reference())
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }

    DEFAULT_PAGE_TOP
}
