//! Cross-module tests: full flow scenarios with mock collaborators,
//! plus property tests for the counters and the NAT table.

pub(crate) mod support;
