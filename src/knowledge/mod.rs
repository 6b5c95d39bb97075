//! Knowledge Graph subsystem.
//!
//! Provides the statement store, the hand-rolled query executor backing
//! `knowledge/query`, the alignment [`verification::VerificationPolicy`]
//! plug-in point consulted by `knowledge/update`, and the
//! [`subscription::KnowledgeSubscriptionHub`] backing `knowledge/subscribe`.
//!
//! Laid out the same way [`crate::server`] separates store / event queue /
//! request handling into sibling modules rather than one large file.

pub mod query_lang;
pub mod store;
pub mod subscription;
pub mod types;
pub mod verification;

pub use query_lang::{execute as execute_query, parse as parse_query, StatementsQuery};
pub use store::{AppliedPatch, InMemoryKnowledgeStore, KnowledgeStore};
pub use subscription::{KnowledgeSubscription, KnowledgeSubscriptionHub, StatementFilter, SubscriptionEvent};
pub use types::{
    GraphQlResult, KGObject, KGPredicate, KGStatement, KGSubject, KnowledgeGraphChangeEvent,
    KnowledgeGraphPatch, KnowledgeQueryParams, KnowledgeSubscribeParams, KnowledgeUpdateParams,
    LiteralValue, PatchOp, QueryFilters, QueryResult, UpdateResult, VerificationStatus,
};
pub use verification::{AlwaysVerified, MinimumCertaintyPolicy, VerificationPolicy};
