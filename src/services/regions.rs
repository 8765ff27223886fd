//! 差异区域：为预览界面标出新旧文档上发生变化的矩形

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::document::{FieldMatch, Page, ParsedDocument, Token};

const DEFAULT_WIDTH: f64 = 50.0;
const DEFAULT_HEIGHT: f64 = 12.0;
const NEIGHBOUR_DISTANCE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub kind: RegionKind,
}

impl Region {
    fn of(token: &Token, kind: RegionKind) -> Self {
        Self {
            x: token.x,
            y: token.y,
            width: if token.width > 0.0 { token.width } else { DEFAULT_WIDTH },
            height: if token.height > 0.0 { token.height } else { DEFAULT_HEIGHT },
            kind,
        }
    }
}

/// 按页组织的差异区域，`old_pages[i]` 与 `new_pages[i]` 对应同一页
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRegions {
    pub old_pages: Vec<Vec<Region>>,
    pub new_pages: Vec<Vec<Region>>,
    pub total_differences: usize,
    /// 从 1 开始的页码
    pub pages_with_differences: Vec<usize>,
}

pub fn diff_regions(old: &ParsedDocument, new: &ParsedDocument) -> DocumentRegions {
    let empty = Page::default();
    let max_pages = old.page_count().max(new.page_count());
    let mut regions = DocumentRegions::default();

    for page_index in 0..max_pages {
        let old_page = old.pages.get(page_index).unwrap_or(&empty);
        let new_page = new.pages.get(page_index).unwrap_or(&empty);

        let mut page = PageDiff::default();
        page.tokens(&old_page.tokens, &new_page.tokens);
        page.fields(&old_page.fields, &new_page.fields);

        if page.count > 0 {
            regions.pages_with_differences.push(page_index + 1);
        }
        regions.total_differences += page.count;
        regions.old_pages.push(page.old);
        regions.new_pages.push(page.new);
    }

    regions
}

#[derive(Default)]
struct PageDiff {
    old: Vec<Region>,
    new: Vec<Region>,
    count: usize,
}

impl PageDiff {
    fn tokens(&mut self, old: &[Token], new: &[Token]) {
        let old_keys: HashSet<String> = old.iter().map(position_key).collect();
        let new_keys: HashSet<String> = new.iter().map(position_key).collect();

        for token in old.iter().filter(|t| !new_keys.contains(&position_key(t))) {
            self.old.push(Region::of(token, RegionKind::Removed));
            self.count += 1;
        }
        for token in new.iter().filter(|t| !old_keys.contains(&position_key(t))) {
            self.new.push(Region::of(token, RegionKind::Added));
            self.count += 1;
        }

        for old_token in old {
            let neighbour = new.iter().find(|n| {
                (n.x - old_token.x).abs() < NEIGHBOUR_DISTANCE
                    && (n.y - old_token.y).abs() < NEIGHBOUR_DISTANCE
            });
            if let Some(new_token) = neighbour {
                if new_token.text != old_token.text {
                    self.old.push(Region::of(old_token, RegionKind::Modified));
                    self.new.push(Region::of(new_token, RegionKind::Modified));
                    self.count += 1;
                }
            }
        }
    }

    fn fields(&mut self, old: &[FieldMatch], new: &[FieldMatch]) {
        for old_field in old {
            match new.iter().find(|f| f.key == old_field.key) {
                Some(new_field) if new_field.joined_text() != old_field.joined_text() => {
                    self.old
                        .extend(old_field.tokens.iter().map(|t| Region::of(t, RegionKind::Modified)));
                    self.new
                        .extend(new_field.tokens.iter().map(|t| Region::of(t, RegionKind::Modified)));
                    self.count += 1;
                }
                Some(_) => {}
                None => {
                    self.old
                        .extend(old_field.tokens.iter().map(|t| Region::of(t, RegionKind::Removed)));
                    self.count += 1;
                }
            }
        }

        for new_field in new.iter().filter(|f| !old.iter().any(|o| o.key == f.key)) {
            self.new
                .extend(new_field.tokens.iter().map(|t| Region::of(t, RegionKind::Added)));
            self.count += 1;
        }
    }
}

fn position_key(token: &Token) -> String {
    format!("{:.2}_{:.2}_{}", token.x, token.y, token.text)
}
