use controlsync_codec::Decoded;
use controlsync_core_types::ControlId;
use serde_json::{Map, Value};

use crate::errors::PageError;
use crate::model::{ElementHandle, FormControl};

/// DOM access by identifier, the only surface the engine touches.
pub trait Page: Send + Sync {
    fn form_id(&self) -> Option<String>;
    fn form_action(&self) -> Option<String>;
    /// Opaque server state token carried by the form, if any.
    fn state_token(&self) -> Option<String>;

    fn form_controls(&self) -> Vec<FormControl>;
    /// Identifiers of every server-managed control currently on the page.
    fn control_ids(&self) -> Vec<ControlId>;
    fn exists(&self, id: &str) -> bool;

    fn set_value(&self, id: &str, value: &Value) -> Result<(), PageError>;
    fn set_attributes(&self, id: &str, attrs: &Map<String, Value>) -> Result<(), PageError>;
    /// Replaces the element with the parsed fragment.
    fn replace_element(&self, id: &str, html: &str) -> Result<(), PageError>;
    /// Moves the control out of every element whose `attribute` equals
    /// `#id`, then removes those elements. Returns how many were removed.
    fn relocate_related(&self, id: &str, attribute: &str) -> Result<usize, PageError>;
    fn append_to_form(&self, html: &str) -> Result<(), PageError>;

    /// Registration markers belong to the element currently carrying `id`;
    /// an element inserted by a replacement starts unmarked.
    fn is_registered(&self, id: &str) -> bool;
    fn mark_registered(&self, id: &str);

    fn select(&self, selector: &str, root: Option<&str>) -> Result<Vec<ElementHandle>, PageError>;
    fn element_by_id(&self, id: &str) -> Option<ElementHandle>;
    fn invoke(&self, element: ElementHandle, method: &str, args: &[Decoded]) -> Result<Decoded, PageError>;
}
