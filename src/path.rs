/*
 * Created on Tue Jul 28 2026
 *
 * This file is a part of pathspace
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # Path vocabulary
//!
//! A path is an ordered sequence of non-empty segments; the empty sequence
//! denotes the root. A segment must not contain the delimiter character
//! `/`. An absolute path string starts with `/`; a relative path string
//! does not.

use crate::error::{Error, PathResult};
use core::fmt;

pub const DELIMITER: char = '/';
/// the sentinel segment carried by a namespace's root node
pub const ROOT_SENTINEL: &str = "[ROOT]";

/// A single, non-empty, delimiter-free path component
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Segment(String);

impl Segment {
    pub fn new(raw: impl Into<String>) -> PathResult<Self> {
        let raw = raw.into();
        Self::validate_str(&raw)?;
        Ok(Self(raw))
    }

    /// confirms that `raw` is usable as a single path component
    pub fn validate_str(raw: &str) -> PathResult<()> {
        if raw.is_empty() {
            return Err(Error::InvalidSegment(raw.to_owned()));
        }
        if raw.contains(DELIMITER) {
            return Err(Error::InvalidSegment(raw.to_owned()));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Segment {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An ordered sequence of segments, anchored at some reference point. Used
/// for both absolute paths (anchored at a namespace root) and relative
/// paths (anchored at some node).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentPath(Vec<Segment>);

pub type AbsolutePath = SegmentPath;
pub type RelativePath = SegmentPath;

impl SegmentPath {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.0
    }

    pub fn push(&mut self, seg: Segment) {
        self.0.push(seg);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// parse an absolute path string (`"/a/b/c"`). A string with no leading
    /// delimiter is still accepted as the degenerate "root" path, matching
    /// the original source's tolerant behavior for the empty/root case.
    pub fn parse_absolute(raw: &str) -> PathResult<AbsolutePath> {
        if raw.is_empty() || raw == "/" {
            return Ok(Self::empty());
        }
        let trimmed = raw.strip_prefix(DELIMITER).unwrap_or(raw);
        Self::parse_sections(trimmed)
    }

    /// parse a path string relative to some node (`"a/b/c"`, no leading `/`)
    pub fn parse_relative(raw: &str) -> PathResult<RelativePath> {
        if raw.is_empty() {
            return Ok(Self::empty());
        }
        Self::parse_sections(raw)
    }

    fn parse_sections(trimmed: &str) -> PathResult<SegmentPath> {
        let mut out = Vec::new();
        for part in trimmed.split(DELIMITER) {
            out.push(Segment::new(part)?);
        }
        Ok(Self(out))
    }

    /// re-insert the leading `/` and rejoin segments; `parse_absolute(format(p)) == p`
    pub fn format_absolute(&self) -> String {
        if self.0.is_empty() {
            return String::from("/");
        }
        let mut s = String::with_capacity(self.0.iter().map(|p| p.as_str().len() + 1).sum());
        for seg in &self.0 {
            s.push(DELIMITER);
            s.push_str(seg.as_str());
        }
        s
    }

    pub fn format_relative(&self) -> String {
        self.0
            .iter()
            .map(Segment::as_str)
            .collect::<Vec<_>>()
            .join(&DELIMITER.to_string())
    }
}

impl fmt::Display for SegmentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_absolute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_absolute_path() {
        let p = SegmentPath::parse_absolute("/path/to/my/test/element").unwrap();
        assert_eq!(
            p.segments().iter().map(Segment::as_str).collect::<Vec<_>>(),
            vec!["path", "to", "my", "test", "element"]
        );
        assert_eq!(p.format_absolute(), "/path/to/my/test/element");
    }

    #[test]
    fn root_path_round_trips() {
        let p = SegmentPath::parse_absolute("/").unwrap();
        assert!(p.is_empty());
        assert_eq!(p.format_absolute(), "/");
    }

    #[test]
    fn rejects_segment_with_delimiter() {
        assert_eq!(
            Segment::new("a/b").unwrap_err(),
            Error::InvalidSegment("a/b".into())
        );
    }

    #[test]
    fn rejects_empty_segment() {
        assert_eq!(
            SegmentPath::parse_absolute("/a//b").unwrap_err(),
            Error::InvalidSegment("".into())
        );
    }

    #[test]
    fn relative_path_rejects_leading_slash_segment() {
        // parse_relative doesn't strip a leading delimiter: the first
        // "segment" would be empty and thus invalid, which is exactly the
        // rejection AppendRelativePath/FetchSubPath need for absolute input.
        assert!(SegmentPath::parse_relative("/a/b").is_err());
    }
}
