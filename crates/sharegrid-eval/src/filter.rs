//! Directional access policy attached to every column and row.
//!
//! A filter is a `send`/`receive` pair. Each side is a list of tokens drawn
//! from `<up>`, `<down>`, `<all>`, `<none>`, `<self>`, `<target>` and glob
//! patterns matched against the peer id. Patterns are resolved relative to
//! an anchor (the id of the column or row carrying the filter), so
//! `../region*` on column `/providers/region1` matches every sibling
//! region node.

use std::fmt;

use bitflags::bitflags;
use sharegrid_common::path::{PathPattern, is_glob};

use crate::error::SchemaError;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct FilterFlags: u8 {
        const UP     = 0b0000_0001;
        const DOWN   = 0b0000_0010;
        const ALL    = 0b0000_0100;
        const SELF   = 0b0000_1000;
        const TARGET = 0b0001_0000;
    }
}

/// One compiled direction of an [`UpdateFilter`].
#[derive(Clone, Debug, PartialEq)]
pub struct FilterSide {
    src: String,
    flags: FilterFlags,
    patterns: Vec<PathPattern>,
    exact: Vec<String>,
}

impl FilterSide {
    pub fn parse(src: &str, anchor: &str) -> Result<Self, SchemaError> {
        let mut side = FilterSide {
            src: src.trim().to_string(),
            flags: FilterFlags::empty(),
            patterns: Vec::new(),
            exact: Vec::new(),
        };
        for token in src.split(|c: char| c == ',' || c.is_whitespace()) {
            if token.is_empty() {
                continue;
            }
            let flag = match token {
                "<up>" => FilterFlags::UP,
                "<down>" => FilterFlags::DOWN,
                "<all>" => FilterFlags::ALL,
                "<self>" => FilterFlags::SELF,
                "<target>" => FilterFlags::TARGET,
                "<none>" => FilterFlags::empty(),
                t if t.starts_with('<') => {
                    return Err(SchemaError::FilterToken {
                        filter: src.to_string(),
                        token: t.to_string(),
                    });
                }
                t if is_glob(t) => {
                    let pattern = PathPattern::resolved(anchor, t).map_err(|source| {
                        SchemaError::Pattern {
                            pattern: t.to_string(),
                            source,
                        }
                    })?;
                    side.patterns.push(pattern);
                    continue;
                }
                t => {
                    side.exact.push(sharegrid_common::resolve_path(anchor, t));
                    continue;
                }
            };
            side.flags |= flag;
        }
        Ok(side)
    }

    fn with_flags(src: &str, flags: FilterFlags) -> Self {
        FilterSide {
            src: src.to_string(),
            flags,
            patterns: Vec::new(),
            exact: Vec::new(),
        }
    }

    pub fn flags(&self) -> FilterFlags {
        self.flags
    }

    pub fn as_str(&self) -> &str {
        &self.src
    }

    fn matches_peer(&self, peer: &str) -> bool {
        self.exact.iter().any(|e| e == peer) || self.patterns.iter().any(|p| p.is_match(peer))
    }

    fn admits(&self, flag: FilterFlags, peer: &str) -> bool {
        self.flags.intersects(flag | FilterFlags::ALL) || self.matches_peer(peer)
    }
}

/// Compiled send/receive policy.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateFilter {
    send: FilterSide,
    receive: FilterSide,
}

impl Default for UpdateFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl UpdateFilter {
    pub fn new(send: &str, receive: &str, anchor: &str) -> Result<Self, SchemaError> {
        Ok(UpdateFilter {
            send: FilterSide::parse(send, anchor)?,
            receive: FilterSide::parse(receive, anchor)?,
        })
    }

    /// Send and receive everything.
    pub fn all() -> Self {
        UpdateFilter {
            send: FilterSide::with_flags("<all>", FilterFlags::ALL),
            receive: FilterSide::with_flags("<all>", FilterFlags::ALL),
        }
    }

    /// Block everything in both directions.
    pub fn none() -> Self {
        UpdateFilter {
            send: FilterSide::with_flags("<none>", FilterFlags::empty()),
            receive: FilterSide::with_flags("<none>", FilterFlags::empty()),
        }
    }

    pub fn send(&self) -> &FilterSide {
        &self.send
    }

    pub fn receive(&self) -> &FilterSide {
        &self.receive
    }

    pub fn send_to_upstream(&self, peer: &str) -> bool {
        self.send.admits(FilterFlags::UP, peer)
    }

    pub fn send_to_downstream(&self, peer: &str) -> bool {
        self.send.admits(FilterFlags::DOWN, peer)
    }

    pub fn receive_from_upstream(&self, peer: &str) -> bool {
        self.receive.admits(FilterFlags::UP, peer)
    }

    /// `target` is the node owning the data in question; `<target>` admits a
    /// downstream peer that is that owner.
    pub fn receive_from_downstream(&self, peer: &str, target: &str) -> bool {
        self.receive.admits(FilterFlags::DOWN, peer)
            || (self.receive.flags.contains(FilterFlags::TARGET) && peer == target)
    }

    /// Local input on node `node`. `<self>` admits any device input on the
    /// node itself, `<target>` only when the node owns the data.
    pub fn receive_from_device(&self, node: &str, target: &str) -> bool {
        self.receive.admits(FilterFlags::SELF, node)
            || (self.receive.flags.contains(FilterFlags::TARGET) && node == target)
    }
}

impl fmt::Display for UpdateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "send={} receive={}", self.send.src, self.receive.src)
    }
}
