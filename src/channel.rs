//! External interfaces of the live tuning loop.
//!
//! Transport of feedback samples and gain commands is the host's concern;
//! the tuner only sees these types. Samples are delivered by calling
//! [`crate::tuning::Tuner::handle_sample`], commands leave through a
//! [`CommandSink`] implementation supplied by the host.

use std::fmt;
use std::io;

/// Addresses one controlled joint: a mechanical unit, a kinematic chain on
/// that unit, and the joint's position within the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointId {
    pub unit: u32,
    pub chain: u32,
    pub joint: u32,
}

impl JointId {
    pub fn new(unit: u32, chain: u32, joint: u32) -> Self {
        Self { unit, chain, joint }
    }

    /// The tuning group this joint belongs to.
    pub fn group(&self) -> GroupId {
        GroupId {
            unit: self.unit,
            chain: self.chain,
        }
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.unit, self.chain, self.joint)
    }
}

/// Key of one logical tuning group. All joints of a group live on the same
/// unit and chain and are evaluated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId {
    pub unit: u32,
    pub chain: u32,
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.unit, self.chain)
    }
}

/// One feedback measurement from a controlled joint. Timestamps are seconds
/// on a clock shared by all samples of a group; only differences are used.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackSample {
    pub velocity_error: f64,
    pub angle_error: f64,
    pub timestamp: f64,
}

/// Receives one ASCII command line per joint each time a new gain set is
/// assigned. Failures are logged by the caller and never stop the loop.
pub trait CommandSink {
    fn send(&mut self, joint: JointId, line: &str) -> io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_addressing() {
        let joint = JointId::new(1, 1, 3);
        assert_eq!(joint.to_string(), "1.1.3");
        assert_eq!(joint.group(), GroupId { unit: 1, chain: 1 });
        assert_eq!(joint.group().to_string(), "1.1");
    }

    #[test]
    fn test_joints_of_one_chain_share_a_group() {
        let a = JointId::new(2, 1, 2);
        let b = JointId::new(2, 1, 3);
        let c = JointId::new(3, 1, 2);
        assert_eq!(a.group(), b.group());
        assert_ne!(a.group(), c.group());
    }
}
