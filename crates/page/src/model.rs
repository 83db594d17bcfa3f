use controlsync_core_types::ControlId;
use serde::Serialize;
use serde_json::Value;

/// Opaque reference to an element returned by selector resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ElementHandle(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Text,
    Hidden,
    Checkbox,
    Radio,
    Select,
    MultiSelect,
    TextArea,
    Button,
}

impl ControlKind {
    pub fn is_checkable(self) -> bool {
        matches!(self, ControlKind::Checkbox | ControlKind::Radio)
    }
}

/// Snapshot of one form field as the request builder sees it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FormControl {
    pub id: ControlId,
    pub name: String,
    pub kind: ControlKind,
    /// Current value; for checkables this is the value submitted when checked.
    pub value: String,
    pub checked: bool,
    /// Selected option values for select elements.
    pub selected: Vec<String>,
    pub disabled: bool,
}

impl FormControl {
    /// Group key for checkables whose name differs from their id.
    /// A trailing `[]` on the name is stripped.
    pub fn group_id(&self) -> Option<String> {
        if !self.kind.is_checkable() || self.name.is_empty() || self.name == self.id.as_str() {
            return None;
        }
        Some(self.name.trim_end_matches("[]").to_string())
    }
}

/// Method invocation recorded by the in-memory page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MethodCall {
    pub target: Option<String>,
    pub method: String,
    pub args: Vec<Value>,
}
