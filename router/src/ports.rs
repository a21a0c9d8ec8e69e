// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Port descriptors: counts, processing disciplines and flow codes.
//!
//! Elements describe their ports with compact strings, `input/output`:
//!
//! - port counts: `"1/1"`, `"1/2"`, `"1-2/0-2"`, `"-/-"` (any number),
//! - processing: `"h/h"` (push), `"l/l"` (pull), `"a/a"` (agnostic),
//!   with one letter per port and the last letter covering the rest
//!   (`"h/lh"`: pull output 0, push outputs 1 and up),
//! - flow codes: which inputs can emit on which outputs; equal letters flow,
//!   `#` matches the same port number only (`"x/x"`: any to any; `"#/#"`:
//!   port i to port i).

use std::fmt::{self, Display, Formatter};

/// Direction of a port, from the owning element's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDir {
    /// A port packets arrive on.
    Input,
    /// A port packets leave by.
    Output,
}

/// The processing discipline of one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    /// Producer-driven: upstream calls `push`.
    Push,
    /// Consumer-driven: downstream calls `pull`.
    Pull,
    /// Either; resolved by the linker from the neighborhood.
    Agnostic,
}

impl Display for PortKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PortKind::Push => write!(f, "push"),
            PortKind::Pull => write!(f, "pull"),
            PortKind::Agnostic => write!(f, "agnostic"),
        }
    }
}

/// Errors from parsing a port descriptor string.
#[derive(Debug, thiserror::Error)]
pub enum PortDescriptorError {
    /// The descriptor is not of the `input/output` form.
    #[error("port descriptor '{0}' missing '/'")]
    MissingSlash(String),
    /// A count segment did not parse.
    #[error("bad port count '{0}'")]
    BadCount(String),
    /// A processing segment contains an unknown letter.
    #[error("bad processing code '{0}'")]
    BadProcessing(String),
}

/// Allowed range for one side's port count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountRange {
    /// Minimum number of ports.
    pub lo: usize,
    /// Maximum number of ports.
    pub hi: usize,
}

impl CountRange {
    fn parse(descriptor: &str) -> Result<CountRange, PortDescriptorError> {
        let bad = || PortDescriptorError::BadCount(descriptor.to_string());
        if descriptor == "-" {
            return Ok(CountRange { lo: 0, hi: usize::MAX });
        }
        if let Some((lo, hi)) = descriptor.split_once('-') {
            let lo = lo.parse::<usize>().map_err(|_| bad())?;
            let hi = if hi.is_empty() {
                usize::MAX
            } else {
                hi.parse::<usize>().map_err(|_| bad())?
            };
            if lo > hi {
                return Err(bad());
            }
            Ok(CountRange { lo, hi })
        } else {
            let n = descriptor.parse::<usize>().map_err(|_| bad())?;
            Ok(CountRange { lo: n, hi: n })
        }
    }

    /// True if `n` ports satisfy this range.
    #[must_use]
    pub fn admits(&self, n: usize) -> bool {
        self.lo <= n && n <= self.hi
    }
}

/// A parsed `port_count` descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortCount {
    /// Allowed input count.
    pub inputs: CountRange,
    /// Allowed output count.
    pub outputs: CountRange,
}

impl PortCount {
    /// Parse a descriptor such as `"1/1"`, `"1-/0-2"` or `"-/-"`.
    pub fn parse(descriptor: &str) -> Result<PortCount, PortDescriptorError> {
        let (inputs, outputs) = descriptor
            .split_once('/')
            .ok_or_else(|| PortDescriptorError::MissingSlash(descriptor.to_string()))?;
        Ok(PortCount {
            inputs: CountRange::parse(inputs)?,
            outputs: CountRange::parse(outputs)?,
        })
    }
}

/// A parsed `processing` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processing {
    inputs: Vec<PortKind>,
    outputs: Vec<PortKind>,
}

impl Processing {
    /// Parse a descriptor such as `"h/h"`, `"l/l"`, `"a/a"` or `"h/lh"`.
    pub fn parse(descriptor: &str) -> Result<Processing, PortDescriptorError> {
        let (inputs, outputs) = descriptor
            .split_once('/')
            .ok_or_else(|| PortDescriptorError::MissingSlash(descriptor.to_string()))?;
        Ok(Processing {
            inputs: Processing::side(inputs, descriptor)?,
            outputs: Processing::side(outputs, descriptor)?,
        })
    }

    fn side(side: &str, whole: &str) -> Result<Vec<PortKind>, PortDescriptorError> {
        side.chars()
            .map(|c| match c {
                'h' => Ok(PortKind::Push),
                'l' => Ok(PortKind::Pull),
                'a' => Ok(PortKind::Agnostic),
                _ => Err(PortDescriptorError::BadProcessing(whole.to_string())),
            })
            .collect()
    }

    fn kind_at(kinds: &[PortKind], port: usize) -> PortKind {
        match kinds {
            [] => PortKind::Agnostic,
            _ => kinds[port.min(kinds.len() - 1)],
        }
    }

    /// Declared kind of input `port`.
    #[must_use]
    pub fn input(&self, port: usize) -> PortKind {
        Processing::kind_at(&self.inputs, port)
    }

    /// Declared kind of output `port`.
    #[must_use]
    pub fn output(&self, port: usize) -> PortKind {
        Processing::kind_at(&self.outputs, port)
    }
}

/// A parsed `flow_code` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowCode {
    inputs: Vec<char>,
    outputs: Vec<char>,
}

impl FlowCode {
    /// Parse a descriptor such as `"x/x"`, `"x/y"` or `"#/#"`.
    pub fn parse(descriptor: &str) -> Result<FlowCode, PortDescriptorError> {
        let (inputs, outputs) = descriptor
            .split_once('/')
            .ok_or_else(|| PortDescriptorError::MissingSlash(descriptor.to_string()))?;
        if inputs.is_empty() || outputs.is_empty() {
            return Err(PortDescriptorError::BadProcessing(descriptor.to_string()));
        }
        Ok(FlowCode {
            inputs: inputs.chars().collect(),
            outputs: outputs.chars().collect(),
        })
    }

    fn code_at(codes: &[char], port: usize) -> char {
        codes[port.min(codes.len() - 1)]
    }

    /// True if packets entering input `in_port` can leave by output
    /// `out_port`.
    #[must_use]
    pub fn flows(&self, in_port: usize, out_port: usize) -> bool {
        let i = FlowCode::code_at(&self.inputs, in_port);
        let o = FlowCode::code_at(&self.outputs, out_port);
        if i == '#' || o == '#' {
            i == o && in_port == out_port
        } else {
            i == o
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn count_ranges() {
        let pc = PortCount::parse("1/1").unwrap();
        assert!(pc.inputs.admits(1));
        assert!(!pc.inputs.admits(0));
        assert!(!pc.inputs.admits(2));

        let pc = PortCount::parse("1-2/0-").unwrap();
        assert!(pc.inputs.admits(2));
        assert!(!pc.inputs.admits(3));
        assert!(pc.outputs.admits(0));
        assert!(pc.outputs.admits(100));

        let pc = PortCount::parse("-/-").unwrap();
        assert!(pc.inputs.admits(0));
        assert!(pc.outputs.admits(9));

        assert!(PortCount::parse("x/1").is_err());
        assert!(PortCount::parse("2-1/1").is_err());
        assert!(PortCount::parse("11").is_err());
    }

    #[test]
    fn processing_letters_repeat() {
        let p = Processing::parse("h/lh").unwrap();
        assert_eq!(p.input(0), PortKind::Push);
        assert_eq!(p.input(5), PortKind::Push);
        assert_eq!(p.output(0), PortKind::Pull);
        assert_eq!(p.output(1), PortKind::Push);
        assert_eq!(p.output(9), PortKind::Push);
        assert!(Processing::parse("q/q").is_err());
    }

    #[test]
    fn flow_codes() {
        let any = FlowCode::parse("x/x").unwrap();
        assert!(any.flows(0, 0));
        assert!(any.flows(3, 1));

        let none = FlowCode::parse("x/y").unwrap();
        assert!(!none.flows(0, 0));

        let same_port = FlowCode::parse("#/#").unwrap();
        assert!(same_port.flows(2, 2));
        assert!(!same_port.flows(0, 1));

        let mixed = FlowCode::parse("xy/x").unwrap();
        assert!(mixed.flows(0, 0));
        assert!(!mixed.flows(1, 0));
    }
}
