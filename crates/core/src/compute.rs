//! Orchestration requests, compute items, and the downstream service set.
//!
//! An [`OrchestrationRequest`] is what arrives on the wire. After
//! [`OrchestrationRequest::into_submission`] it becomes a validated
//! [`TaskSubmission`], the normalized structure the coordinator works with.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::types::{TaskId, TaskKey};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of compute items in one task.
pub const MAX_COMPUTE_ITEMS: usize = 1000;

/// Maximum length of a task name.
const MAX_NAME_LEN: usize = 255;

/// Maximum length of a caller-supplied task id.
const MAX_TASK_ID_LEN: usize = 64;

/// Maximum length of `scenario_id` / `business_type_id`.
const MAX_KEY_FIELD_LEN: usize = 128;

// ---------------------------------------------------------------------------
// ServiceKind
// ---------------------------------------------------------------------------

/// The closed set of downstream services a compute item can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Revenue,
    Rebates,
    Specialty,
}

impl ServiceKind {
    /// Every service, in dispatch-table order.
    pub const ALL: [ServiceKind; 3] = [
        ServiceKind::Revenue,
        ServiceKind::Rebates,
        ServiceKind::Specialty,
    ];

    /// Wire and database name of the service.
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKind::Revenue => "revenue",
            ServiceKind::Rebates => "rebates",
            ServiceKind::Specialty => "specialty",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "revenue" => Ok(ServiceKind::Revenue),
            "rebates" => Ok(ServiceKind::Rebates),
            "specialty" => Ok(ServiceKind::Specialty),
            other => Err(CoreError::Validation(format!(
                "Unknown service name: \"{other}\""
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ComputeItem
// ---------------------------------------------------------------------------

/// One unit of work: a key plus up to three service sub-requests.
///
/// Each sub-request is a JSON object carrying whatever fields that service
/// needs beyond the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeItem {
    pub scenario_id: String,
    pub business_type_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebates: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<Value>,
}

impl ComputeItem {
    /// Build an item with no sub-requests.
    pub fn new(scenario_id: impl Into<String>, business_type_id: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            business_type_id: business_type_id.into(),
            revenue: None,
            rebates: None,
            specialty: None,
        }
    }

    /// Attach a sub-request for `kind`.
    pub fn with_service(mut self, kind: ServiceKind, fields: Value) -> Self {
        *self.slot_mut(kind) = Some(fields);
        self
    }

    /// The sequencing key of this item.
    pub fn key(&self) -> TaskKey {
        TaskKey::new(&self.scenario_id, &self.business_type_id)
    }

    /// The raw sub-request for `kind`, treating JSON `null` as absent.
    pub fn sub_request(&self, kind: ServiceKind) -> Option<&Value> {
        let slot = match kind {
            ServiceKind::Revenue => &self.revenue,
            ServiceKind::Rebates => &self.rebates,
            ServiceKind::Specialty => &self.specialty,
        };
        slot.as_ref().filter(|v| !v.is_null())
    }

    /// Services with a populated sub-request, in dispatch-table order.
    pub fn services(&self) -> Vec<ServiceKind> {
        ServiceKind::ALL
            .into_iter()
            .filter(|kind| self.sub_request(*kind).is_some())
            .collect()
    }

    /// Body sent downstream: `{scenario_id, business_type_id, ...fields}`.
    ///
    /// The key fields always come from the item, even if the sub-request
    /// object repeats them with other values.
    pub fn request_payload(&self, kind: ServiceKind) -> Option<Value> {
        let fields = self.sub_request(kind)?;
        let mut body = fields.as_object().cloned().unwrap_or_default();
        body.insert(
            "scenario_id".to_string(),
            Value::String(self.scenario_id.clone()),
        );
        body.insert(
            "business_type_id".to_string(),
            Value::String(self.business_type_id.clone()),
        );
        Some(Value::Object(body))
    }

    fn slot_mut(&mut self, kind: ServiceKind) -> &mut Option<Value> {
        match kind {
            ServiceKind::Revenue => &mut self.revenue,
            ServiceKind::Rebates => &mut self.rebates,
            ServiceKind::Specialty => &mut self.specialty,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Inbound orchestration request as decoded from any transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationRequest {
    /// Caller-supplied id. Generated on ingress when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(rename = "task_name")]
    pub name: String,
    #[serde(
        rename = "task_description",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    pub compute: Vec<ComputeItem>,
}

/// A validated task ready to be handed to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub task_id: TaskId,
    pub name: String,
    pub description: Option<String>,
    pub items: Vec<ComputeItem>,
}

impl OrchestrationRequest {
    /// Validate the request and normalize it into a [`TaskSubmission`].
    ///
    /// A fresh UUID v4 task id is assigned when the caller did not supply one.
    pub fn into_submission(self) -> Result<TaskSubmission, CoreError> {
        validate_request(&self)?;
        let task_id = self
            .task_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Ok(TaskSubmission {
            task_id,
            name: self.name.trim().to_string(),
            description: self.description,
            items: self.compute,
        })
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate the shape of an orchestration request.
///
/// Rules:
/// - `task_name` must not be blank and must not exceed `MAX_NAME_LEN`.
/// - A supplied `task_id` must be a well-formed identifier.
/// - `compute` must hold between 1 and [`MAX_COMPUTE_ITEMS`] items.
/// - Every item must have well-formed key fields, at least one service
///   sub-request, and each sub-request must be a JSON object.
/// - No two items in one task may share a key.
pub fn validate_request(request: &OrchestrationRequest) -> Result<(), CoreError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation(
            "task_name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "task_name must not exceed {MAX_NAME_LEN} characters"
        )));
    }

    if let Some(task_id) = &request.task_id {
        validate_task_id(task_id)?;
    }

    if request.compute.is_empty() {
        return Err(CoreError::Validation(
            "compute must contain at least one item".to_string(),
        ));
    }
    if request.compute.len() > MAX_COMPUTE_ITEMS {
        return Err(CoreError::Validation(format!(
            "compute must not contain more than {MAX_COMPUTE_ITEMS} items"
        )));
    }

    for (index, item) in request.compute.iter().enumerate() {
        validate_item(index, item)?;
    }

    Ok(())
}

/// Validate a caller-supplied task id.
///
/// Must be non-empty, at most `MAX_TASK_ID_LEN` characters, and contain only
/// alphanumeric, hyphen, or underscore characters.
pub fn validate_task_id(task_id: &str) -> Result<(), CoreError> {
    if task_id.is_empty() {
        return Err(CoreError::Validation("task_id must not be empty".to_string()));
    }
    if task_id.len() > MAX_TASK_ID_LEN {
        return Err(CoreError::Validation(format!(
            "task_id must not exceed {MAX_TASK_ID_LEN} characters"
        )));
    }
    if !task_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::Validation(
            "task_id may only contain alphanumeric, hyphen, or underscore characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_item(index: usize, item: &ComputeItem) -> Result<(), CoreError> {
    validate_key_field(index, "scenario_id", &item.scenario_id)?;
    validate_key_field(index, "business_type_id", &item.business_type_id)?;

    let services = item.services();
    if services.is_empty() {
        return Err(CoreError::Validation(format!(
            "compute[{index}] must provide at least one of revenue, rebates, or specialty"
        )));
    }

    for kind in services {
        if let Some(fields) = item.sub_request(kind) {
            if !fields.is_object() {
                return Err(CoreError::Validation(format!(
                    "compute[{index}].{kind} must be a JSON object"
                )));
            }
        }
    }

    Ok(())
}

fn validate_key_field(index: usize, field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!(
            "compute[{index}].{field} must not be empty"
        )));
    }
    if value.len() > MAX_KEY_FIELD_LEN {
        return Err(CoreError::Validation(format!(
            "compute[{index}].{field} must not exceed {MAX_KEY_FIELD_LEN} characters"
        )));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CoreError::Validation(format!(
            "compute[{index}].{field} must not contain whitespace or control characters"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn item(scenario: &str, business: &str) -> ComputeItem {
        ComputeItem::new(scenario, business).with_service(ServiceKind::Revenue, json!({}))
    }

    fn request(compute: Vec<ComputeItem>) -> OrchestrationRequest {
        OrchestrationRequest {
            task_id: None,
            name: "quarterly".to_string(),
            description: None,
            compute,
        }
    }

    fn assert_validation(result: Result<(), CoreError>, needle: &str) {
        match result {
            Err(CoreError::Validation(msg)) => {
                assert!(msg.contains(needle), "message {msg:?} should mention {needle:?}")
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    // -- ServiceKind ----------------------------------------------------------

    #[test]
    fn service_kind_round_trips_through_str() {
        for kind in ServiceKind::ALL {
            assert_eq!(kind.as_str().parse::<ServiceKind>().unwrap(), kind);
        }
        assert!("billing".parse::<ServiceKind>().is_err());
    }

    // -- ComputeItem ----------------------------------------------------------

    #[test]
    fn services_lists_only_populated_sub_requests() {
        let item = ComputeItem::new("s1", "b1")
            .with_service(ServiceKind::Specialty, json!({"tier": 2}))
            .with_service(ServiceKind::Revenue, json!({}));
        assert_eq!(
            item.services(),
            vec![ServiceKind::Revenue, ServiceKind::Specialty]
        );
    }

    #[test]
    fn null_sub_request_counts_as_absent() {
        let item: ComputeItem = serde_json::from_value(json!({
            "scenario_id": "s1",
            "business_type_id": "b1",
            "revenue": null,
            "rebates": {"rate": 0.1}
        }))
        .unwrap();
        assert_eq!(item.services(), vec![ServiceKind::Rebates]);
    }

    #[test]
    fn request_payload_merges_key_fields() {
        let item = ComputeItem::new("s1", "b1").with_service(
            ServiceKind::Rebates,
            json!({"rate": 0.25, "scenario_id": "spoofed"}),
        );
        let payload = item.request_payload(ServiceKind::Rebates).unwrap();
        assert_eq!(payload["scenario_id"], "s1");
        assert_eq!(payload["business_type_id"], "b1");
        assert_eq!(payload["rate"], 0.25);
        assert!(item.request_payload(ServiceKind::Revenue).is_none());
    }

    // -- Validation -----------------------------------------------------------

    #[test]
    fn valid_request_passes() {
        assert!(validate_request(&request(vec![item("s1", "b1"), item("s1", "b2")])).is_ok());
    }

    #[test]
    fn empty_compute_rejected() {
        assert_validation(validate_request(&request(vec![])), "at least one item");
    }

    #[test]
    fn blank_name_rejected() {
        let mut req = request(vec![item("s1", "b1")]);
        req.name = "   ".to_string();
        assert_validation(validate_request(&req), "task_name");
    }

    #[test]
    fn blank_key_field_rejected() {
        assert_validation(
            validate_request(&request(vec![item("", "b1")])),
            "compute[0].scenario_id",
        );
        assert_validation(
            validate_request(&request(vec![item("s1", "b 1")])),
            "compute[0].business_type_id",
        );
    }

    #[test]
    fn item_without_services_rejected() {
        assert_validation(
            validate_request(&request(vec![ComputeItem::new("s1", "b1")])),
            "at least one of revenue",
        );
    }

    #[test]
    fn non_object_sub_request_rejected() {
        let bad = ComputeItem::new("s1", "b1").with_service(ServiceKind::Revenue, json!([1, 2]));
        assert_validation(
            validate_request(&request(vec![bad])),
            "compute[0].revenue must be a JSON object",
        );
    }

    #[test]
    fn items_sharing_a_key_are_accepted() {
        let submission = request(vec![item("s1", "b1"), item("s1", "b1")])
            .into_submission()
            .unwrap();
        assert_eq!(submission.items.len(), 2);
        assert_eq!(submission.items[0].key(), submission.items[1].key());
    }

    #[test]
    fn malformed_task_id_rejected() {
        assert_validation(validate_task_id(""), "must not be empty");
        assert_validation(validate_task_id("a/b"), "alphanumeric");
        assert_validation(validate_task_id(&"x".repeat(65)), "must not exceed");
        assert!(validate_task_id("task-42_a").is_ok());
    }

    // -- Submission -----------------------------------------------------------

    #[test]
    fn into_submission_generates_task_id() {
        let submission = request(vec![item("s1", "b1")]).into_submission().unwrap();
        assert_eq!(submission.task_id.len(), 36);
        assert_eq!(submission.items.len(), 1);
    }

    #[test]
    fn into_submission_keeps_caller_task_id() {
        let mut req = request(vec![item("s1", "b1")]);
        req.task_id = Some("caller-1".to_string());
        assert_eq!(req.into_submission().unwrap().task_id, "caller-1");
    }

    #[test]
    fn wire_format_maps_task_name_and_compute() {
        let req: OrchestrationRequest = serde_json::from_value(json!({
            "task_name": "n",
            "task_description": "d",
            "compute": [{"scenario_id": "s1", "business_type_id": "b1", "revenue": {}}]
        }))
        .unwrap();
        assert_eq!(req.name, "n");
        assert_eq!(req.description.as_deref(), Some("d"));
        assert!(req.task_id.is_none());
    }
}
