//! 特殊字段配置
//!
//! 特殊字段通过标签文字在页面上定位，然后按各自的策略比较，
//! 不参与普通的逐行比对。

use serde::{Deserialize, Serialize};

/// 自定义判定规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateId {
    /// 固定周期费用：天数必须一致，最终金额必须变化
    FixedRecurringCost,
}

/// 字段比较策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldPolicy {
    /// 第 `index` 个片段的金额必须不同
    MustDiffer { index: usize },
    /// 第 `index` 个片段的金额必须相同
    MustMatchAt { index: usize },
    /// 整行文字必须相同
    MustMatchWhole,
    /// 交给指定的判定函数
    Custom { predicate: PredicateId },
}

/// 单个特殊字段定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialFieldDefinition {
    /// 用于定位的标签文字
    pub label: String,
    pub policy: FieldPolicy,
    /// 结果分组名称
    pub group: String,
}

impl SpecialFieldDefinition {
    pub fn new(label: impl Into<String>, policy: FieldPolicy, group: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            policy,
            group: group.into(),
        }
    }
}

pub const GROUP_MUST_DIFFER: &str = "Must Differ";
pub const GROUP_MUST_MATCH: &str = "Must Match";
pub const GROUP_BFDC_MUST_DIFFER: &str = "BFDC Must Differ";

/// 有序的特殊字段规则集合
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRuleSet {
    #[serde(default, rename = "field")]
    pub fields: Vec<SpecialFieldDefinition>,
}

impl FieldRuleSet {
    pub fn new(fields: Vec<SpecialFieldDefinition>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn get(&self, label: &str) -> Option<&SpecialFieldDefinition> {
        self.fields.iter().find(|f| f.label == label)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 内置的能源发票规则
    pub fn invoice_defaults() -> Self {
        use FieldPolicy::*;

        let recurring = Custom {
            predicate: PredicateId::FixedRecurringCost,
        };

        Self::new(vec![
            SpecialFieldDefinition::new("Totale kosten in de verbruiksperiode", MustDiffer { index: 2 }, GROUP_MUST_DIFFER),
            SpecialFieldDefinition::new("Door jou te betalen", MustDiffer { index: 2 }, GROUP_MUST_DIFFER),
            SpecialFieldDefinition::new("Leveringskosten van stroom en gas", MustDiffer { index: 2 }, GROUP_MUST_DIFFER),
            SpecialFieldDefinition::new("Overheidsheffingen op stroom en gas, dit dragen we af aan de overheid", MustMatchWhole, GROUP_MUST_MATCH),
            SpecialFieldDefinition::new("Netbeheerkosten op stroom en gas, dit dragen we af aan je netbeheerder", MustMatchWhole, GROUP_MUST_MATCH),
            SpecialFieldDefinition::new("In rekening gebrachte termijnbedragen", MustMatchWhole, GROUP_MUST_MATCH),
            SpecialFieldDefinition::new("Totale netto verbruik", MustDiffer { index: 1 }, GROUP_BFDC_MUST_DIFFER),
            SpecialFieldDefinition::new("Vaste leveringskosten voor stroom", recurring.clone(), GROUP_BFDC_MUST_DIFFER),
            SpecialFieldDefinition::new("Vaste leveringskosten voor gas", recurring, GROUP_BFDC_MUST_DIFFER),
            SpecialFieldDefinition::new("TERZAKE ENERGIE GROENE STROOM TERZAKE ENERGIE DYNAMISCH", MustDiffer { index: 0 }, GROUP_BFDC_MUST_DIFFER),
            SpecialFieldDefinition::new("(01-09-2024 / 01-10-2024) | 21% BTW", MustDiffer { index: 0 }, GROUP_BFDC_MUST_DIFFER),
        ])
    }
}

impl Default for FieldRuleSet {
    fn default() -> Self {
        Self::invoice_defaults()
    }
}
