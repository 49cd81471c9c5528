use serde::{Deserialize, Serialize};

/// One entry of a worksheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorksheetItem {
    /// Reference to a bundle
    Bundle { bundle_id: String },
    /// Free text
    Markup { value: String },
    /// Display directive (`% schema ...`, `% display ...`)
    Directive { value: String },
    /// Anything else the service knows about (subworksheets, searches)
    Other {
        #[serde(default)]
        value: String,
    },
}

impl WorksheetItem {
    pub fn bundle(bundle_id: impl Into<String>) -> Self {
        WorksheetItem::Bundle {
            bundle_id: bundle_id.into(),
        }
    }

    pub fn markup(value: impl Into<String>) -> Self {
        WorksheetItem::Markup {
            value: value.into(),
        }
    }

    pub fn directive(value: impl Into<String>) -> Self {
        WorksheetItem::Directive {
            value: value.into(),
        }
    }

    pub fn bundle_id(&self) -> Option<&str> {
        match self {
            WorksheetItem::Bundle { bundle_id } => Some(bundle_id),
            _ => None,
        }
    }

    /// Whether the item carries context for the bundle that follows it.
    ///
    /// Blank markup lines separate preludes rather than belong to them.
    pub fn is_prelude(&self) -> bool {
        match self {
            WorksheetItem::Markup { value } => !value.is_empty(),
            WorksheetItem::Directive { .. } => true,
            _ => false,
        }
    }
}

/// Short listing entry for a worksheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorksheetSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// A worksheet with its ordered items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worksheet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub items: Vec<WorksheetItem>,
}

impl Worksheet {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            title: None,
            items: Vec::new(),
        }
    }

    pub fn with_items(mut self, items: Vec<WorksheetItem>) -> Self {
        self.items = items;
        self
    }

    pub fn summary(&self) -> WorksheetSummary {
        WorksheetSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            title: self.title.clone(),
        }
    }

    pub fn contains_bundle(&self, bundle_id: &str) -> bool {
        self.items.iter().any(|item| item.bundle_id() == Some(bundle_id))
    }
}
