//! Knowledge Graph wire types — statements, patches, change events, and the
//! request/response shapes for `knowledge/query`, `knowledge/update`, and
//! `knowledge/subscribe`.
//!
//! Follows the same modeling choices as the Task wire types in
//! [`crate::types`]: sum types for polymorphic fields (here, `KGObject` is
//! resource xor literal, matching how `Part`/`FileContent` are modeled
//! there), camelCase on the wire, `serde_json::Value` for opaque bags.

use serde::{Deserialize, Serialize};

/// A subject reference: an identifier, optionally typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KGSubject {
    /// URI/identifier of the subject resource.
    pub id: String,
    /// Optional type URI for the subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

/// A predicate reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KGPredicate {
    /// Predicate URI.
    pub id: String,
}

/// The literal scalar kinds a KG object literal may carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    /// A string literal.
    String(String),
    /// A numeric literal.
    Number(f64),
    /// A boolean literal.
    Bool(bool),
}

/// A KG statement's object: exactly one of a resource reference (`id`) or a
/// literal value (`value`).
///
/// Modeled as a sum type rather than an `Option<id>`/`Option<value>` pair so
/// the resource/literal exclusivity is enforced by construction, not by a
/// runtime check — mirroring how `FileContent` enforces "exactly one of
/// bytes/uri" in [`crate::types`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KGObject {
    /// A reference to another resource.
    Resource {
        /// URI/identifier of the referenced resource.
        id: String,
        /// Optional type URI.
        #[serde(skip_serializing_if = "Option::is_none", rename = "type")]
        type_: Option<String>,
    },
    /// A literal value.
    Literal {
        /// The literal's value.
        value: LiteralValue,
        /// Optional type URI (e.g. an XSD datatype URI).
        #[serde(skip_serializing_if = "Option::is_none", rename = "type")]
        type_: Option<String>,
    },
}

impl KGObject {
    /// Returns this object's identity component for statement identity
    /// purposes (I5): the resource id, or the literal value rendered as a
    /// string.
    pub fn identity_key(&self) -> String {
        match self {
            KGObject::Resource { id, .. } => id.clone(),
            KGObject::Literal { value, .. } => match value {
                LiteralValue::String(s) => s.clone(),
                LiteralValue::Number(n) => n.to_string(),
                LiteralValue::Bool(b) => b.to_string(),
            },
        }
    }
}

/// A single subject-predicate-object statement in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KGStatement {
    /// The statement's subject.
    pub subject: KGSubject,
    /// The statement's predicate.
    pub predicate: KGPredicate,
    /// The statement's object.
    pub object: KGObject,
    /// Optional named-graph URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
    /// Confidence in [0.0, 1.0]. Absence means "unspecified", not "1" (I6).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certainty: Option<f64>,
    /// Opaque provenance information (source, timestamp, agent, etc.).
    /// Carried but not interpreted by the transport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<serde_json::Value>,
}

impl KGStatement {
    /// The identity tuple used for remove/replace matching and for set
    /// semantics (I5): `(subject.id, predicate.id, object identity, graph)`.
    pub fn identity(&self) -> (String, String, String, Option<String>) {
        (
            self.subject.id.clone(),
            self.predicate.id.clone(),
            self.object.identity_key(),
            self.graph.clone(),
        )
    }

    /// Clamps `certainty` into `[0.0, 1.0]` in place (I6).
    pub fn clamp_certainty(&mut self) {
        if let Some(c) = self.certainty {
            self.certainty = Some(c.clamp(0.0, 1.0));
        }
    }
}

/// The operation a [`KnowledgeGraphPatch`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Add the statement if not already present (I7).
    Add,
    /// Remove the statement matching the I5 identity tuple.
    Remove,
    /// Remove then add: same-subject+predicate+graph statements are removed
    /// before the new statement is added.
    Replace,
}

/// A single KG mutation: an operation plus the statement it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeGraphPatch {
    /// The operation to apply.
    pub op: PatchOp,
    /// The statement the operation applies to.
    pub statement: KGStatement,
}

/// An event published for one applied patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeGraphChangeEvent {
    /// The operation that produced this event.
    pub op: PatchOp,
    /// The statement affected.
    pub statement: KGStatement,
    /// Unique id for this change (128-bit random, rendered as a UUID).
    pub change_id: String,
    /// Wall-clock RFC3339 timestamp.
    pub timestamp: String,
    /// Optional metadata attached to the change (e.g. verification status).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_metadata: Option<serde_json::Value>,
}

/// The outcome of alignment verification for one patch or one update batch.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationStatus {
    /// The operation was verified and accepted.
    Verified,
    /// The operation is accepted pending later review.
    PendingReview,
    /// The operation was rejected, carrying a human-readable reason.
    Rejected(String),
}

impl VerificationStatus {
    /// Renders the wire string form (`"Verified"`, `"Pending Review"`,
    /// `"Rejected — <reason>"`).
    pub fn as_wire_string(&self) -> String {
        match self {
            VerificationStatus::Verified => "Verified".to_string(),
            VerificationStatus::PendingReview => "Pending Review".to_string(),
            VerificationStatus::Rejected(reason) => format!("Rejected — {reason}"),
        }
    }

    /// True if this status should surface as an `AlignmentViolationError`
    /// when it is the outcome for an entire update batch.
    pub fn is_rejected(&self) -> bool {
        matches!(self, VerificationStatus::Rejected(_))
    }
}

impl Serialize for VerificationStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_wire_string())
    }
}

impl<'de> Deserialize<'de> for VerificationStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == "Verified" {
            Ok(VerificationStatus::Verified)
        } else if s == "Pending Review" {
            Ok(VerificationStatus::PendingReview)
        } else if let Some(reason) = s.strip_prefix("Rejected — ") {
            Ok(VerificationStatus::Rejected(reason.to_string()))
        } else if let Some(reason) = s.strip_prefix("Rejected - ") {
            Ok(VerificationStatus::Rejected(reason.to_string()))
        } else {
            Err(serde::de::Error::custom(format!(
                "unrecognized verification status '{s}'"
            )))
        }
    }
}

/// Filters narrowing a `query` or `subscribe` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilters {
    /// Drop statements with `certainty` below this threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_certainty: Option<f64>,
    /// Drop statements whose provenance timestamp is older than this many
    /// seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_seconds: Option<i64>,
}

/// Params for `knowledge/query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeQueryParams {
    /// The query language. Only `"graphql"` is implemented.
    pub query_language: String,
    /// The query text.
    pub query: String,
    /// Query variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
    /// Result filters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<QueryFilters>,
}

/// The GraphQL-shaped result of a query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphQlResult {
    /// The query's data, if it succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Errors encountered while executing the query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<serde_json::Value>>,
}

/// Result of a `knowledge/query` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// The GraphQL-shaped `{data, errors?}` result.
    pub result: GraphQlResult,
    /// Optional metadata about how the query was executed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_metadata: Option<serde_json::Value>,
}

/// Params for `knowledge/update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeUpdateParams {
    /// The patches to apply, in order.
    pub mutations: Vec<KnowledgeGraphPatch>,
    /// Optional associated task id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Optional associated session id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Identifier of the agent proposing the update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_agent_id: Option<String>,
    /// Free-text justification for the update, consulted by verification
    /// policies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    /// Opaque metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Result of a `knowledge/update` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    /// `true` only if every patch in the batch was accepted.
    pub success: bool,
    /// Number of statements actually changed.
    pub statements_affected: u64,
    /// Change ids produced for the applied patches.
    pub affected_ids: Vec<String>,
    /// The verification outcome for the batch (or, if mixed, the most
    /// severe outcome across the batch).
    pub verification_status: VerificationStatus,
    /// Human-readable detail when `success=false` but the batch was not
    /// wholly rejected (e.g. a partial failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_details: Option<String>,
}

/// Params for `knowledge/subscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeSubscribeParams {
    /// The subscription query text.
    pub subscription_query: String,
    /// The query language the subscription query is written in.
    pub query_language: String,
    /// Query variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
    /// Filters narrowing which change events are forwarded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<QueryFilters>,
}
