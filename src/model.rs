//! Core data model for ADAPT.
//!
//! The registry (repositories, branches, services, clients, endpoints) says
//! who depends on whom. Changes, impact records and action items track an
//! interface change from report to remediation.

mod action;
mod change;
mod impact;
mod registry;
mod report;
mod status;

pub use action::{
    ActionItem, ActionItemUpdate, ActionKind, ClientArtifacts, PullRequestRef, TicketRef,
};
pub use change::{AffectedEndpoint, ChangeKind, ChangeOrigin, ChangeReport};
pub use impact::{AffectedClient, Health};
pub use registry::{Branch, BranchProfile, Client, Endpoint, LinkOutcome, Repository, Service};
pub use report::{
    ActionItemDetail, ArtifactLink, BranchContext, BranchTree, ChangeRef, ClientTree,
    ConsumerHealth, EndpointHealth, RemediationTarget, RepositoryTree, ServiceHealth, ServiceTree,
};
pub use status::Status;

/// One page of a listing. Pages are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub const DEFAULT_SIZE: u32 = 100;

    pub fn new(number: u32, size: u32) -> Self {
        Self { number, size }
    }

    /// Rows to skip before this page. Page 0 is treated as page 1.
    pub fn offset(self) -> i64 {
        i64::from(self.number.saturating_sub(1)) * i64::from(self.size)
    }

    pub fn limit(self) -> i64 {
        i64::from(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_SIZE)
    }
}
