//! Core domain types for the encore flow engine.
//!
//! This crate provides the strongly-typed identifiers shared by every other
//! encore crate.

pub mod id;

pub use id::{
    CartFunnelId, CartId, EmailDeliveryId, EmailTemplateGroupId, EmailTemplateId, FanId, FlowId,
    FlowRunActionId, FlowRunId, OrderId, ParseIdError, ProductId, WorkspaceId,
};
