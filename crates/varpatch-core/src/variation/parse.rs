//! Building variation diffs from text.
//!
//! Lines are consumed in diff order. Each line exists at BEFORE, AFTER or
//! both, and is attached below the innermost open annotation of every time it
//! exists at. One annotation stack per time keeps the two views independent,
//! so an unchanged line may end up below different parents.

use difference::{Changeset, Difference};

use crate::error::{DiffParseError, DiffParseErrorKind};
use crate::feature::{AnnotationParser, AnnotationType};

use super::{DiffType, LineRange, NodeId, NodeType, Time, VariationDiff, VariationTree};

/// One line of a diff: its text and the versions it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub diff_type: DiffType,
    pub text: String,
}

impl DiffLine {
    pub fn new(diff_type: DiffType, text: impl Into<String>) -> Self {
        DiffLine {
            diff_type,
            text: text.into(),
        }
    }
}

/// How error positions are reported.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LineOrigin<'a> {
    /// Position in the parsed input itself (a single file or a diff).
    Sequence(&'a str),
    /// Position in the BEFORE or AFTER source the line came from.
    PerTime([&'a str; 2]),
}

// ============================================================================
// Entry Points
// ============================================================================

impl VariationDiff {
    /// Diff two versions of a source text.
    pub fn from_sources(
        before: &str,
        after: &str,
        parser: &dyn AnnotationParser,
    ) -> Result<Self, DiffParseError> {
        Self::from_named_sources(("before", before), ("after", after), parser)
    }

    /// Like [`VariationDiff::from_sources`], naming each version in errors.
    pub fn from_named_sources(
        before: (&str, &str),
        after: (&str, &str),
        parser: &dyn AnnotationParser,
    ) -> Result<Self, DiffParseError> {
        let lines = line_diff(before.1, after.1)
            .into_iter()
            .enumerate()
            .map(|(index, line)| (index + 1, line));
        parse_lines(lines, LineOrigin::PerTime([before.0, after.0]), parser)
    }

    /// Diff the source texts of two trees.
    pub fn from_trees(
        before: &VariationTree,
        after: &VariationTree,
        parser: &dyn AnnotationParser,
    ) -> Result<Self, DiffParseError> {
        Self::from_sources(&before.unparse(), &after.unparse(), parser)
    }

    /// Parse the body of a unified diff.
    ///
    /// Everything up to the first `@@` hunk header is skipped, as are further
    /// hunk headers and `\ No newline` markers. Lines start with `+`, `-` or a
    /// space; empty lines count as unchanged.
    pub fn from_unified(text: &str, parser: &dyn AnnotationParser) -> Result<Self, DiffParseError> {
        let has_hunks = text.lines().any(|line| line.starts_with("@@"));
        let mut in_hunk = !has_hunks;
        let mut lines = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.starts_with("@@") {
                in_hunk = true;
                continue;
            }
            if !in_hunk || line.starts_with('\\') {
                continue;
            }
            let (diff_type, text) = match line.chars().next() {
                Some('+') => (DiffType::Add, &line[1..]),
                Some('-') => (DiffType::Rem, &line[1..]),
                Some(' ') => (DiffType::Non, &line[1..]),
                _ => (DiffType::Non, line),
            };
            lines.push((index + 1, DiffLine::new(diff_type, text)));
        }
        parse_lines(lines, LineOrigin::Sequence("<diff>"), parser)
    }
}

/// Line-level alignment of two texts.
fn line_diff(before: &str, after: &str) -> Vec<DiffLine> {
    let before_lines: Vec<&str> = before.lines().collect();
    let after_lines: Vec<&str> = after.lines().collect();

    if before_lines.is_empty() || after_lines.is_empty() {
        return before_lines
            .iter()
            .map(|line| DiffLine::new(DiffType::Rem, *line))
            .chain(after_lines.iter().map(|line| DiffLine::new(DiffType::Add, *line)))
            .collect();
    }

    let changeset = Changeset::new(&before_lines.join("\n"), &after_lines.join("\n"), "\n");
    let mut lines = Vec::new();
    for difference in &changeset.diffs {
        let (diff_type, chunk) = match difference {
            Difference::Same(chunk) => (DiffType::Non, chunk),
            Difference::Add(chunk) => (DiffType::Add, chunk),
            Difference::Rem(chunk) => (DiffType::Rem, chunk),
        };
        lines.extend(chunk.split('\n').map(|line| DiffLine::new(diff_type, line)));
    }
    lines
}

// ============================================================================
// Stack-Based Parser
// ============================================================================

pub(crate) fn parse_lines(
    lines: impl IntoIterator<Item = (usize, DiffLine)>,
    origin: LineOrigin<'_>,
    parser: &dyn AnnotationParser,
) -> Result<VariationDiff, DiffParseError> {
    let mut builder = Builder::new(origin, parser);
    for (number, line) in lines {
        builder.push(number, line)?;
    }
    builder.finish()
}

struct Builder<'a> {
    diff: VariationDiff,
    parser: &'a dyn AnnotationParser,
    origin: LineOrigin<'a>,
    /// Open annotations per time, innermost last.
    stacks: [Vec<NodeId>; 2],
    /// Next line number per time.
    line_numbers: [usize; 2],
    /// Input line of the last pushed line.
    last_line: usize,
}

impl<'a> Builder<'a> {
    fn new(origin: LineOrigin<'a>, parser: &'a dyn AnnotationParser) -> Self {
        let diff = VariationDiff::new();
        let root = diff.root();
        Builder {
            diff,
            parser,
            origin,
            stacks: [vec![root], vec![root]],
            line_numbers: [1, 1],
            last_line: 0,
        }
    }

    fn error(&self, time: Time, kind: DiffParseErrorKind) -> DiffParseError {
        let (source_name, line) = match self.origin {
            LineOrigin::Sequence(name) => (name, self.last_line),
            LineOrigin::PerTime(names) => (names[time.index()], self.line_numbers[time.index()]),
        };
        DiffParseError {
            source_name: source_name.to_string(),
            line,
            kind,
        }
    }

    fn top(&self, time: Time) -> NodeId {
        let stack = &self.stacks[time.index()];
        stack[stack.len() - 1]
    }

    fn push(&mut self, number: usize, line: DiffLine) -> Result<(), DiffParseError> {
        self.last_line = number;
        let times: Vec<Time> = Time::ALL
            .into_iter()
            .filter(|&time| line.diff_type.exists_at(time))
            .collect();
        let first_time = times[0];

        let annotation = self
            .parser
            .parse_annotation(&line.text)
            .map_err(|e| self.error(first_time, e.into()))?;

        let node_type = match annotation.kind {
            AnnotationType::Endif => {
                for &time in &times {
                    self.close_if(time, &line.text)?;
                }
                self.advance(&times);
                return Ok(());
            }
            AnnotationType::If => NodeType::If,
            AnnotationType::Elif => NodeType::Elif,
            AnnotationType::Else => NodeType::Else,
            AnnotationType::None => NodeType::Artifact,
        };

        if node_type.is_branch() {
            for &time in &times {
                match self.diff.node(self.top(time)).node_type {
                    NodeType::If | NodeType::Elif => {}
                    NodeType::Else => {
                        return Err(self.error(time, DiffParseErrorKind::BranchAfterElse))
                    }
                    _ => return Err(self.error(time, DiffParseErrorKind::BranchWithoutIf)),
                }
            }
        }

        let id = self
            .diff
            .create_node(line.diff_type, node_type, annotation.formula, line.text);
        for &time in &times {
            let parent = self.top(time);
            self.diff.add_child(parent, id, time);
            let number = self.line_numbers[time.index()];
            self.diff.node_mut(id).set_lines(time, LineRange::single(number));
            if node_type.is_annotation() {
                self.stacks[time.index()].push(id);
            }
        }
        self.advance(&times);
        Ok(())
    }

    /// Pop the branch chain ending at the innermost `#if` at `time`.
    fn close_if(&mut self, time: Time, endif: &str) -> Result<(), DiffParseError> {
        loop {
            if self.stacks[time.index()].len() <= 1 {
                return Err(self.error(time, DiffParseErrorKind::EndifWithoutIf));
            }
            let Some(id) = self.stacks[time.index()].pop() else {
                return Err(self.error(time, DiffParseErrorKind::EndifWithoutIf));
            };
            if self.diff.node(id).node_type != NodeType::If {
                continue;
            }

            let number = self.line_numbers[time.index()];
            let node = self.diff.node_mut(id);
            node.end_label = Some(endif.to_string());
            let from = node.lines(time).map_or(number, |lines| lines.from);
            node.set_lines(time, LineRange::new(from, number + 1));
            return Ok(());
        }
    }

    fn advance(&mut self, times: &[Time]) {
        for time in times {
            self.line_numbers[time.index()] += 1;
        }
    }

    fn finish(mut self) -> Result<VariationDiff, DiffParseError> {
        for time in Time::ALL {
            if self.stacks[time.index()].len() > 1 {
                self.line_numbers[time.index()] -= 1;
                return Err(self.error(time, DiffParseErrorKind::MissingEndif));
            }
        }
        Ok(self.diff)
    }
}
