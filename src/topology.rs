// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Root promotion and network departure for the node's DAG role.
// Author: Lukas Bower

//! Root/topology controller.

use crate::platform::{Ipv6Prefix, Routing};
use crate::report::{Report, ReportSink};

/// Result of a root promotion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteOutcome {
    /// Root operation started with the given prefix.
    Promoted(Ipv6Prefix),
    /// The node was already root; nothing was changed.
    AlreadyRoot,
}

/// Promote the node to DAG root using the platform default prefix.
///
/// When the node is already root only the informational line is emitted and
/// the routing stack is not touched further.
pub fn promote_to_root<N>(network: &mut N, out: &mut dyn ReportSink) -> PromoteOutcome
where
    N: Routing + ?Sized,
{
    if network.is_root() {
        log::info!("[topology] root requested, node already root");
        out.emit(&Report::AlreadyRoot);
        return PromoteOutcome::AlreadyRoot;
    }
    let prefix = network.default_prefix();
    network.set_prefix(prefix);
    network.start_root();
    log::info!("[topology] started root with prefix {prefix}");
    PromoteOutcome::Promoted(prefix)
}

/// Leave the network if the node is root. Returns `true` if it left.
pub fn leave_if_root<N>(network: &mut N) -> bool
where
    N: Routing + ?Sized,
{
    if !network.is_root() {
        return false;
    }
    network.leave_network();
    log::info!("[topology] left network, root role dropped");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockNetwork, NetworkCall};

    #[test]
    fn promotes_with_default_prefix() {
        let mut network = MockNetwork::new();
        let mut out = Vec::<String>::new();
        let outcome = promote_to_root(&mut network, &mut out);
        let prefix = network.default_prefix();
        assert_eq!(outcome, PromoteOutcome::Promoted(prefix));
        assert_eq!(
            network.calls(),
            &[NetworkCall::SetPrefix(prefix), NetworkCall::StartRoot]
        );
        assert!(out.is_empty());
        assert!(network.is_root());
    }

    #[test]
    fn second_promotion_is_informational_only() {
        let mut network = MockNetwork::new();
        let mut out = Vec::<String>::new();
        promote_to_root(&mut network, &mut out);
        network.clear_calls();
        assert_eq!(
            promote_to_root(&mut network, &mut out),
            PromoteOutcome::AlreadyRoot
        );
        assert!(network.calls().is_empty());
        assert_eq!(out, vec!["Node is already a DAG root".to_owned()]);
    }

    #[test]
    fn leave_only_when_root() {
        let mut network = MockNetwork::new();
        assert!(!leave_if_root(&mut network));
        assert!(network.calls().is_empty());
        network.set_root(true);
        assert!(leave_if_root(&mut network));
        assert_eq!(network.calls(), &[NetworkCall::LeaveNetwork]);
        assert!(!network.is_root());
    }
}
