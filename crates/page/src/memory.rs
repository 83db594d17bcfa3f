use std::collections::HashSet;

use controlsync_codec::Decoded;
use controlsync_core_types::ControlId;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::api::Page;
use crate::dom::{Dom, NodeIdx, ROOT};
use crate::errors::PageError;
use crate::model::{ControlKind, ElementHandle, FormControl, MethodCall};
use crate::selector::Selector;

/// Name of the hidden input carrying the server state token.
pub const STATE_TOKEN_FIELD: &str = "__formstate";

/// Attribute marking a non-field element as a server-managed control.
pub const CONTROL_ATTRIBUTE: &str = "data-control";

struct PageState {
    dom: Dom,
    /// Arena indices are never reused, so a replaced element starts unmarked.
    registered: HashSet<NodeIdx>,
    calls: Vec<MethodCall>,
    focused: Option<String>,
}

/// Page held entirely in memory. Used by the CLI and tests in place of a browser.
pub struct InMemoryPage {
    state: Mutex<PageState>,
}

impl InMemoryPage {
    pub fn parse(html: &str) -> Result<Self, PageError> {
        Ok(Self {
            state: Mutex::new(PageState {
                dom: Dom::parse(html)?,
                registered: HashSet::new(),
                calls: Vec::new(),
                focused: None,
            }),
        })
    }

    pub fn to_html(&self) -> String {
        self.state.lock().dom.outer_html(ROOT)
    }

    pub fn outer_html(&self, id: &str) -> Option<String> {
        let state = self.state.lock();
        state.dom.element_by_id(id).map(|idx| state.dom.outer_html(idx))
    }

    pub fn text(&self, id: &str) -> Option<String> {
        let state = self.state.lock();
        state.dom.element_by_id(id).map(|idx| state.dom.text_content(idx))
    }

    pub fn attribute(&self, id: &str, name: &str) -> Option<String> {
        let state = self.state.lock();
        let idx = state.dom.element_by_id(id)?;
        state.dom.attr(idx, name).map(str::to_string)
    }

    pub fn has_class(&self, id: &str, class: &str) -> bool {
        let state = self.state.lock();
        state
            .dom
            .element_by_id(id)
            .map(|idx| state.dom.has_class(idx, class))
            .unwrap_or(false)
    }

    /// Current submitted value of a field, or text of any other element.
    pub fn value_of(&self, id: &str) -> Option<String> {
        let state = self.state.lock();
        let idx = state.dom.element_by_id(id)?;
        Some(read_value(&state.dom, idx))
    }

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state.lock().calls.clone()
    }

    pub fn focused(&self) -> Option<String> {
        self.state.lock().focused.clone()
    }

    /// Simulates user input on a field. The caller still marks the control dirty.
    pub fn set_user_value(&self, id: &str, value: Value) -> Result<(), PageError> {
        self.set_value(id, &value)
    }
}

impl Page for InMemoryPage {
    fn form_id(&self) -> Option<String> {
        let state = self.state.lock();
        let form = state.dom.first_element("form")?;
        state.dom.attr(form, "id").map(str::to_string)
    }

    fn form_action(&self) -> Option<String> {
        let state = self.state.lock();
        let form = state.dom.first_element("form")?;
        state.dom.attr(form, "action").map(str::to_string)
    }

    fn state_token(&self) -> Option<String> {
        let state = self.state.lock();
        let dom = &state.dom;
        let token = dom
            .elements(ROOT)
            .find(|idx| {
                dom.tag(*idx) == Some("input") && dom.attr(*idx, "name") == Some(STATE_TOKEN_FIELD)
            })
            .and_then(|idx| dom.attr(idx, "value").map(str::to_string));
        token
    }

    fn form_controls(&self) -> Vec<FormControl> {
        let state = self.state.lock();
        let dom = &state.dom;
        let scope = dom.first_element("form").unwrap_or(ROOT);
        dom.elements(scope)
            .filter_map(|idx| describe_field(dom, idx))
            .collect()
    }

    fn control_ids(&self) -> Vec<ControlId> {
        let state = self.state.lock();
        let dom = &state.dom;
        dom.elements(ROOT)
            .filter(|idx| is_control(dom, *idx))
            .filter_map(|idx| dom.attr(idx, "id").map(ControlId::from))
            .collect()
    }

    fn exists(&self, id: &str) -> bool {
        self.state.lock().dom.element_by_id(id).is_some()
    }

    fn set_value(&self, id: &str, value: &Value) -> Result<(), PageError> {
        let mut state = self.state.lock();
        let idx = lookup(&state.dom, id)?;
        write_value(&mut state.dom, idx, value);
        trace!(%id, "value set");
        Ok(())
    }

    fn set_attributes(&self, id: &str, attrs: &Map<String, Value>) -> Result<(), PageError> {
        let mut state = self.state.lock();
        let idx = lookup(&state.dom, id)?;
        for (name, value) in attrs {
            match value {
                Value::Null | Value::Bool(false) => state.dom.remove_attr(idx, name),
                Value::Bool(true) => state.dom.set_attr(idx, name, name.as_str()),
                Value::String(text) => state.dom.set_attr(idx, name, text.as_str()),
                other => state.dom.set_attr(idx, name, other.to_string()),
            }
        }
        Ok(())
    }

    fn replace_element(&self, id: &str, html: &str) -> Result<(), PageError> {
        let mut state = self.state.lock();
        let idx = lookup(&state.dom, id)?;
        let fresh = state.dom.parse_fragment(html)?;
        state.dom.replace(idx, &fresh);
        debug!(%id, nodes = fresh.len(), "element replaced");
        Ok(())
    }

    fn relocate_related(&self, id: &str, attribute: &str) -> Result<usize, PageError> {
        let mut state = self.state.lock();
        let control = lookup(&state.dom, id)?;
        let marker = format!("#{id}");
        let related: Vec<NodeIdx> = state
            .dom
            .elements(ROOT)
            .filter(|idx| state.dom.attr(*idx, attribute) == Some(marker.as_str()))
            .collect();
        for idx in &related {
            if !state.dom.is_attached(*idx) {
                continue;
            }
            if state.dom.is_ancestor(*idx, control) {
                state.dom.insert_before(*idx, control);
            }
            state.dom.detach(*idx);
        }
        Ok(related.len())
    }

    fn append_to_form(&self, html: &str) -> Result<(), PageError> {
        let mut state = self.state.lock();
        let target = state
            .dom
            .first_element("form")
            .or_else(|| state.dom.first_element("body"))
            .ok_or(PageError::NoForm)?;
        for idx in state.dom.parse_fragment(html)? {
            state.dom.append(target, idx);
        }
        Ok(())
    }

    fn is_registered(&self, id: &str) -> bool {
        let state = self.state.lock();
        state
            .dom
            .element_by_id(id)
            .is_some_and(|idx| state.registered.contains(&idx))
    }

    fn mark_registered(&self, id: &str) {
        let mut state = self.state.lock();
        if let Some(idx) = state.dom.element_by_id(id) {
            state.registered.insert(idx);
        }
    }

    fn select(&self, selector: &str, root: Option<&str>) -> Result<Vec<ElementHandle>, PageError> {
        let selector = Selector::parse(selector)?;
        let state = self.state.lock();
        let scope = match root {
            Some(root) => match state.dom.element_by_id(root) {
                Some(idx) => idx,
                None => return Ok(Vec::new()),
            },
            None => ROOT,
        };
        Ok(state
            .dom
            .elements(scope)
            .filter(|idx| selector.matches(&state.dom, *idx, scope))
            .map(ElementHandle)
            .collect())
    }

    fn element_by_id(&self, id: &str) -> Option<ElementHandle> {
        self.state.lock().dom.element_by_id(id).map(ElementHandle)
    }

    fn invoke(&self, element: ElementHandle, method: &str, args: &[Decoded]) -> Result<Decoded, PageError> {
        let mut state = self.state.lock();
        let idx = element.0;
        if !state.dom.is_element(idx) {
            return Err(PageError::NotFound(format!("element #{idx}")));
        }
        let target = state.dom.attr(idx, "id").map(str::to_string);
        let text_arg = |pos: usize| args.get(pos).map(Decoded::to_text);
        let result = match method {
            "val" => match args.first() {
                None => Decoded::from(read_value(&state.dom, idx)),
                Some(value) => {
                    write_value(&mut state.dom, idx, &value.to_json());
                    Decoded::Undefined
                }
            },
            "attr" | "prop" => {
                let name = text_arg(0).ok_or_else(|| bad_args(method, "attribute name required"))?;
                match args.get(1) {
                    None => state
                        .dom
                        .attr(idx, &name)
                        .map(Decoded::from)
                        .unwrap_or_default(),
                    Some(Decoded::Bool(false) | Decoded::Null) => {
                        state.dom.remove_attr(idx, &name);
                        Decoded::Undefined
                    }
                    Some(Decoded::Bool(true)) => {
                        state.dom.set_attr(idx, &name, name.as_str());
                        Decoded::Undefined
                    }
                    Some(value) => {
                        state.dom.set_attr(idx, &name, value.to_text());
                        Decoded::Undefined
                    }
                }
            }
            "removeAttr" => {
                let name = text_arg(0).ok_or_else(|| bad_args(method, "attribute name required"))?;
                state.dom.remove_attr(idx, &name);
                Decoded::Undefined
            }
            "addClass" | "removeClass" | "toggleClass" => {
                let names = text_arg(0).ok_or_else(|| bad_args(method, "class list required"))?;
                let mut classes = state.dom.classes(idx);
                for name in names.split_whitespace() {
                    let present = classes.iter().any(|c| c == name);
                    let add = match method {
                        "addClass" => true,
                        "removeClass" => false,
                        _ => !present,
                    };
                    if add && !present {
                        classes.push(name.to_string());
                    } else if !add {
                        classes.retain(|c| c != name);
                    }
                }
                state.dom.set_classes(idx, &classes);
                Decoded::Undefined
            }
            "hasClass" => {
                let name = text_arg(0).ok_or_else(|| bad_args(method, "class name required"))?;
                Decoded::Bool(state.dom.has_class(idx, &name))
            }
            "html" => match text_arg(0) {
                None => Decoded::from(state.dom.inner_html(idx)),
                Some(html) => {
                    let fresh = state.dom.parse_fragment(&html)?;
                    state.dom.clear_children(idx);
                    for child in fresh {
                        state.dom.append(idx, child);
                    }
                    Decoded::Undefined
                }
            },
            "text" => match text_arg(0) {
                None => Decoded::from(state.dom.text_content(idx)),
                Some(text) => {
                    state.dom.set_text(idx, &text);
                    Decoded::Undefined
                }
            },
            "show" => {
                state.dom.remove_attr(idx, "hidden");
                Decoded::Undefined
            }
            "hide" => {
                state.dom.set_attr(idx, "hidden", "hidden");
                Decoded::Undefined
            }
            "remove" => {
                state.dom.detach(idx);
                Decoded::Undefined
            }
            "focus" => {
                state.focused = target.clone();
                Decoded::Undefined
            }
            "blur" | "click" | "trigger" => Decoded::Undefined,
            other => return Err(PageError::UnknownMethod(other.to_string())),
        };
        state.calls.push(MethodCall {
            target,
            method: method.to_string(),
            args: args.iter().map(Decoded::to_json).collect(),
        });
        Ok(result)
    }
}

fn lookup(dom: &Dom, id: &str) -> Result<NodeIdx, PageError> {
    dom.element_by_id(id)
        .ok_or_else(|| PageError::NotFound(id.to_string()))
}

fn bad_args(method: &str, reason: &str) -> PageError {
    PageError::BadArguments {
        method: method.to_string(),
        reason: reason.to_string(),
    }
}

fn field_kind(dom: &Dom, idx: NodeIdx) -> Option<ControlKind> {
    match dom.tag(idx)? {
        "textarea" => Some(ControlKind::TextArea),
        "select" if dom.has_attr(idx, "multiple") => Some(ControlKind::MultiSelect),
        "select" => Some(ControlKind::Select),
        "button" => Some(ControlKind::Button),
        "input" => Some(
            match dom
                .attr(idx, "type")
                .map(str::to_ascii_lowercase)
                .as_deref()
            {
                Some("checkbox") => ControlKind::Checkbox,
                Some("radio") => ControlKind::Radio,
                Some("hidden") => ControlKind::Hidden,
                Some("button" | "submit" | "reset" | "image") => ControlKind::Button,
                _ => ControlKind::Text,
            },
        ),
        _ => None,
    }
}

fn is_control(dom: &Dom, idx: NodeIdx) -> bool {
    if dom.has_attr(idx, CONTROL_ATTRIBUTE) {
        return true;
    }
    field_kind(dom, idx).is_some()
        && !dom
            .attr(idx, "name")
            .is_some_and(|name| name.starts_with("__"))
}

fn describe_field(dom: &Dom, idx: NodeIdx) -> Option<FormControl> {
    let kind = field_kind(dom, idx)?;
    let name = dom.attr(idx, "name").unwrap_or_default().to_string();
    if name.starts_with("__") {
        return None;
    }
    let id = dom
        .attr(idx, "id")
        .map(str::to_string)
        .or_else(|| (!name.is_empty()).then(|| name.clone()))?;
    let selected = match kind {
        ControlKind::Select | ControlKind::MultiSelect => selected_options(dom, idx),
        _ => Vec::new(),
    };
    let value = match kind {
        ControlKind::Checkbox | ControlKind::Radio => {
            dom.attr(idx, "value").unwrap_or("on").to_string()
        }
        _ => read_value(dom, idx),
    };
    Some(FormControl {
        id: ControlId::new(id),
        name,
        kind,
        value,
        checked: dom.has_attr(idx, "checked"),
        selected,
        disabled: dom.has_attr(idx, "disabled"),
    })
}

fn options(dom: &Dom, select: NodeIdx) -> Vec<NodeIdx> {
    dom.elements(select)
        .filter(|idx| dom.tag(*idx) == Some("option"))
        .collect()
}

fn option_value(dom: &Dom, option: NodeIdx) -> String {
    dom.attr(option, "value")
        .map(str::to_string)
        .unwrap_or_else(|| dom.text_content(option))
}

fn selected_options(dom: &Dom, select: NodeIdx) -> Vec<String> {
    let all = options(dom, select);
    let chosen: Vec<String> = all
        .iter()
        .filter(|idx| dom.has_attr(**idx, "selected"))
        .map(|idx| option_value(dom, *idx))
        .collect();
    if chosen.is_empty() && !dom.has_attr(select, "multiple") {
        return all.first().map(|idx| vec![option_value(dom, *idx)]).unwrap_or_default();
    }
    chosen
}

fn read_value(dom: &Dom, idx: NodeIdx) -> String {
    match field_kind(dom, idx) {
        Some(ControlKind::TextArea) => dom.text_content(idx),
        Some(ControlKind::Select | ControlKind::MultiSelect) => {
            selected_options(dom, idx).join(",")
        }
        Some(_) => dom.attr(idx, "value").unwrap_or_default().to_string(),
        None => dom.text_content(idx),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Clears `checked` on the other radios sharing this radio's name.
fn uncheck_siblings(dom: &mut Dom, radio: NodeIdx) {
    let Some(name) = dom.attr(radio, "name").filter(|name| !name.is_empty()) else {
        return;
    };
    let name = name.to_string();
    let siblings: Vec<NodeIdx> = dom
        .elements(ROOT)
        .filter(|idx| {
            *idx != radio
                && field_kind(dom, *idx) == Some(ControlKind::Radio)
                && dom.attr(*idx, "name") == Some(name.as_str())
        })
        .collect();
    for idx in siblings {
        dom.remove_attr(idx, "checked");
    }
}

fn write_value(dom: &mut Dom, idx: NodeIdx, value: &Value) {
    match field_kind(dom, idx) {
        Some(kind @ (ControlKind::Checkbox | ControlKind::Radio)) => {
            let checked = match value {
                Value::Bool(checked) => *checked,
                other => dom.attr(idx, "value").unwrap_or("on") == value_text(other),
            };
            if checked {
                if kind == ControlKind::Radio {
                    uncheck_siblings(dom, idx);
                }
                dom.set_attr(idx, "checked", "checked");
            } else {
                dom.remove_attr(idx, "checked");
            }
        }
        Some(ControlKind::Select | ControlKind::MultiSelect) => {
            let wanted: Vec<String> = match value {
                Value::Array(items) => items.iter().map(value_text).collect(),
                other => vec![value_text(other)],
            };
            for option in options(dom, idx) {
                if wanted.contains(&option_value(dom, option)) {
                    dom.set_attr(option, "selected", "selected");
                } else {
                    dom.remove_attr(option, "selected");
                }
            }
        }
        Some(ControlKind::TextArea) => dom.set_text(idx, &value_text(value)),
        Some(_) => dom.set_attr(idx, "value", value_text(value)),
        None => dom.set_text(idx, &value_text(value)),
    }
}
