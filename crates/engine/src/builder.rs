use std::collections::BTreeMap;
use std::time::Duration;

use controlsync_codec::CodecValue;
use controlsync_core_types::{CallType, ControlId, EventId};
use controlsync_page::{ControlKind, FormControl, Page};
use controlsync_state_center::ChangeSet;
use serde_json::{json, Map, Value};

pub const FIELD_FORM_ID: &str = "__formid";
pub const FIELD_FORM_STATE: &str = "__formstate";
pub const FIELD_SYNC: &str = "__sync";

/// Optional debounce placement of an update in the action queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActionTiming {
    pub is_last: bool,
    pub delay: Duration,
}

/// Caller parameters of one synchronized update.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateParams {
    pub control_id: ControlId,
    pub event_id: EventId,
    pub asynchronous: bool,
    pub action_param: Option<CodecValue>,
    pub timing: Option<ActionTiming>,
    /// Refuse further blocking updates until this one's response is processed.
    pub block: bool,
}

impl UpdateParams {
    pub fn new(control_id: impl Into<ControlId>, event_id: EventId) -> Self {
        Self {
            control_id: control_id.into(),
            event_id,
            asynchronous: false,
            action_param: None,
            timing: None,
            block: false,
        }
    }

    pub fn asynchronous(mut self) -> Self {
        self.asynchronous = true;
        self
    }

    pub fn blocking(mut self) -> Self {
        self.block = true;
        self
    }

    pub fn with_param(mut self, param: CodecValue) -> Self {
        self.action_param = Some(param);
        self
    }

    pub fn with_timing(mut self, timing: ActionTiming) -> Self {
        self.timing = Some(timing);
        self
    }
}

/// Assembles the form-encoded payload of one request.
pub struct RequestBuilder<'a> {
    page: &'a dyn Page,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(page: &'a dyn Page) -> Self {
        Self { page }
    }

    /// Builds the field list. With `full_resync` every control is sent,
    /// otherwise only controls dirty in `changes`.
    pub fn build(
        &self,
        params: &UpdateParams,
        call_type: CallType,
        changes: &ChangeSet,
        full_resync: bool,
    ) -> Vec<(String, String)> {
        let mut fields = vec![(
            FIELD_FORM_ID.to_string(),
            self.page.form_id().unwrap_or_default(),
        )];
        if let Some(token) = self.page.state_token() {
            fields.push((FIELD_FORM_STATE.to_string(), token));
        }

        let controls: Vec<FormControl> = self
            .page
            .form_controls()
            .into_iter()
            .filter(|control| !control.disabled && control.kind != ControlKind::Button)
            .collect();
        let include = |id: &ControlId| full_resync || changes.is_dirty(id);

        for control in controls.iter().filter(|c| !c.kind.is_checkable()) {
            if !include(&control.id) {
                continue;
            }
            match control.kind {
                ControlKind::MultiSelect => {
                    let key = format!("{}[]", control.id);
                    fields.extend(control.selected.iter().map(|value| (key.clone(), value.clone())));
                }
                ControlKind::Select => fields.push((
                    control.id.to_string(),
                    control.selected.first().cloned().unwrap_or_default(),
                )),
                _ => fields.push((control.id.to_string(), control.value.clone())),
            }
        }

        let blob = json!({
            "callType": call_type,
            "controlId": params.control_id,
            "eventId": params.event_id,
            "async": params.asynchronous,
            "checkables": checkables(&controls, changes, full_resync),
            "values": changes.staged_json(),
            "param": params.action_param.as_ref().map(CodecValue::encode).unwrap_or(Value::Null),
        });
        fields.push((FIELD_SYNC.to_string(), blob.to_string()));
        fields
    }
}

struct Group<'c> {
    kind: ControlKind,
    members: Vec<&'c FormControl>,
}

fn checkables(controls: &[FormControl], changes: &ChangeSet, full_resync: bool) -> Value {
    let mut out = Map::new();
    let mut groups: BTreeMap<String, Group<'_>> = BTreeMap::new();

    for control in controls.iter().filter(|c| c.kind.is_checkable()) {
        match control.group_id() {
            None => {
                if full_resync || changes.is_dirty(&control.id) {
                    out.insert(control.id.to_string(), Value::Bool(control.checked));
                }
            }
            Some(group) => groups
                .entry(group)
                .or_insert_with(|| Group {
                    kind: control.kind,
                    members: Vec::new(),
                })
                .members
                .push(control),
        }
    }

    for (group_id, group) in groups {
        let touched = full_resync
            || changes.is_dirty(&ControlId::new(group_id.as_str()))
            || group.members.iter().any(|m| changes.is_dirty(&m.id));
        if !touched {
            continue;
        }
        let checked = group.members.iter().filter(|m| m.checked);
        let value = match group.kind {
            ControlKind::Radio => checked
                .map(|m| Value::String(m.value.clone()))
                .next()
                .unwrap_or(Value::Null),
            _ => {
                let values: Vec<Value> = checked.map(|m| Value::String(m.value.clone())).collect();
                if values.is_empty() {
                    Value::Null
                } else {
                    Value::Array(values)
                }
            }
        };
        out.insert(group_id, value);
    }
    Value::Object(out)
}
