//! The program assembler driver (base spec §4.5): line classification, the
//! two-pass label-and-arithmetic encoding pass, and the small set of
//! accessors the base spec's library surface names (`parse_file`,
//! `process_nodes`, `assemble`, `hexify`).
//!
//! Grounded on the overall shape of the teacher's own `Assembler` (in
//! `lc-as::as_state`) -- a struct that owns a token/line stream plus a
//! target-specific codec and drives it to completion -- but built around
//! the base spec's much smaller grammar: whole lines, not a lexer token
//! stream, since §4.5's line classifier is itself the base spec's tokeniser.

use std::collections::HashMap;

use log::{debug, info, warn};

use x86_ops::Codec;

use crate::error::AssembleError;
use crate::expr;
use crate::labels::{self, LabelTarget};
use crate::node::ProgramNode;

/// Drives one program's worth of assembly text through line classification,
/// label resolution, and the codec, per the base spec's two-pass algorithm.
/// Per §5, a single instance is not safe to share across threads during
/// `process_nodes`.
pub struct Assembler {
    codec: Codec,
    nodes: Vec<ProgramNode>,
}

impl Assembler {
    pub fn new(codec: Codec) -> Assembler {
        Assembler {
            codec,
            nodes: Vec::new(),
        }
    }

    pub fn nodes(&self) -> &[ProgramNode] {
        &self.nodes
    }

    /// Reads `path` from disk and appends its lines to the node list via
    /// [`Self::parse_lines`]. I/O failure propagates to the caller; this is
    /// a structural precondition, not match-failure data.
    pub fn parse_file(&mut self, path: &str) -> std::io::Result<()> {
        let text = std::fs::read_to_string(path)?;
        self.parse_lines(&text);
        Ok(())
    }

    /// Classifies each line of `text` per §4.5 and appends the resulting
    /// nodes. Lines are 1-indexed in `line_nr`, matching how a human reading
    /// the source file would refer to them in a diagnostic.
    pub fn parse_lines(&mut self, text: &str) {
        for (offset, raw_line) in text.lines().enumerate() {
            let line_nr = offset + 1;
            self.classify_line(raw_line, line_nr);
        }
    }

    /// Binds a label name directly to a fixed absolute address, bypassing
    /// stream-position tracking entirely. The base spec's line grammar
    /// names no textual syntax for this (see `DESIGN.md`); this is the only
    /// way to produce an [`ProgramNode::Address`] node.
    pub fn bind_address(&mut self, name: impl Into<String>, value: i64) {
        self.nodes.push(ProgramNode::Address {
            name: name.into(),
            value,
        });
    }

    fn classify_line(&mut self, raw_line: &str, line_nr: usize) {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            return;
        }

        if let Some(rest) = line.strip_prefix('#') {
            self.nodes.push(ProgramNode::Macro {
                text: rest.trim().to_string(),
                line_nr,
            });
            return;
        }

        if line.contains(':') {
            if line.matches(':').count() > 1 {
                warn!("{}", AssembleError::MultipleColons { line_nr });
                return;
            }
            let (name, rest) = line.split_once(':').expect("checked above");
            let name = name.trim().to_string();
            self.nodes.push(ProgramNode::Label { name, line_nr });
            let rest = rest.trim();
            if !rest.is_empty() {
                self.classify_statement(rest, line_nr);
            }
            return;
        }

        self.classify_statement(line, line_nr);
    }

    /// Classifies a bare statement (no label prefix): a `db`/`dw`/`dd`/`dq`
    /// data directive expands into one instruction node per value; anything
    /// else is a single instruction node.
    fn classify_statement(&mut self, statement: &str, line_nr: usize) {
        let mut words = statement.splitn(2, char::is_whitespace);
        let head = words.next().unwrap_or("");
        let rest = words.next().unwrap_or("").trim();

        if let Some(prefix) = data_directive_prefix(head) {
            if !rest.is_empty() {
                for value in x86_ops::split_top_level_commas(rest) {
                    self.nodes.push(ProgramNode::Instruction {
                        text: format!("{prefix} {value}"),
                        line_nr,
                        encoded_bytes: None,
                        processed: false,
                    });
                }
                return;
            }
        }

        self.nodes.push(ProgramNode::Instruction {
            text: statement.to_string(),
            line_nr,
            encoded_bytes: None,
            processed: false,
        });
    }

    /// The two-pass encoding algorithm of §4.5: sizing with placeholders,
    /// first encoding, then size-stabilisation. Returns the diagnostics
    /// accumulated along the way; the assembled bytes are always available
    /// afterwards through [`Self::assemble`], processed or not.
    pub fn process_nodes(&mut self, code_base: i64) -> Vec<AssembleError> {
        let mut diagnostics = Vec::new();

        let label_refs = self.collect_labels(&mut diagnostics);
        let (uses_label, uses_arith) = self.mark_nodes(&label_refs);

        // Pass A: sizing with placeholders is implicit -- `positions` is
        // recomputed from `ProgramNode::size`, which already returns the
        // four-byte estimate for any node not yet processed. Label targets
        // are re-derived from `positions` on every pass (via
        // `resolve_labels`), not fixed once, since an offset-label's
        // position moves as the estimates around it get more accurate.
        // Pass B: first encoding. Its own arithmetic/template diagnostics are
        // provisional -- only Pass C's are kept, since a node that fails here
        // purely because of the conservative 4-byte size estimate may well
        // succeed once positions are re-derived from real sizes.
        let positions = self.compute_positions();
        let labels = resolve_labels(&label_refs, &positions);
        self.encode_pass(code_base, &labels, &uses_label, &uses_arith, &positions, &mut Vec::new());

        // Pass C: recompute positions from the now-actual sizes and re-run
        // the marked instructions; report non-convergence per node.
        let positions = self.compute_positions();
        let labels = resolve_labels(&label_refs, &positions);
        let previous_sizes: Vec<usize> = self.nodes.iter().map(ProgramNode::size).collect();
        self.encode_pass(code_base, &labels, &uses_label, &uses_arith, &positions, &mut diagnostics);

        for (index, node) in self.nodes.iter().enumerate() {
            if (uses_label[index] || uses_arith[index]) && node.size() != previous_sizes[index] {
                let line_nr = node.line_nr();
                diagnostics.push(AssembleError::SizeChanged { index, line_nr });
                warn!("{}", AssembleError::SizeChanged { index, line_nr });
            }
        }

        diagnostics
    }

    /// Builds the label reference table (name -> where to find its target)
    /// and reports duplicate definitions. Address nodes and offset labels
    /// share one namespace, per §3's invariant that label names are unique
    /// across a program. An offset label's reference is its defining node's
    /// index, not a baked-in position -- see [`resolve_labels`].
    fn collect_labels(&self, diagnostics: &mut Vec<AssembleError>) -> HashMap<String, LabelRef> {
        let mut labels: HashMap<String, LabelRef> = HashMap::new();

        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                ProgramNode::Label { name, line_nr } => {
                    if labels.contains_key(name) {
                        let err = AssembleError::DuplicateLabel {
                            name: name.clone(),
                            line_nr: *line_nr,
                        };
                        warn!("{err}");
                        diagnostics.push(err);
                    } else {
                        labels.insert(name.clone(), LabelRef::NodeOffset(index));
                    }
                }
                ProgramNode::Address { name, value } => {
                    if labels.contains_key(name) {
                        let err = AssembleError::DuplicateLabel {
                            name: name.clone(),
                            line_nr: 0,
                        };
                        warn!("{err}");
                        diagnostics.push(err);
                    } else {
                        labels.insert(name.clone(), LabelRef::Fixed(*value));
                    }
                }
                _ => {}
            }
        }

        labels
    }

    /// For every node, whether its text references any known label and
    /// whether it contains an arithmetic operator character -- the two
    /// "mark" passes §4.5 describes as part of Pass A.
    fn mark_nodes(&self, labels: &HashMap<String, LabelRef>) -> (Vec<bool>, Vec<bool>) {
        let mut uses_label = vec![false; self.nodes.len()];
        let mut uses_arith = vec![false; self.nodes.len()];

        for (index, node) in self.nodes.iter().enumerate() {
            let Some(text) = node.as_instruction_text() else {
                continue;
            };
            uses_label[index] = labels.keys().any(|name| labels::contains_whole_word(text, name));
            uses_arith[index] = text.contains(['+', '-', '*', '/', '%']);
        }

        (uses_label, uses_arith)
    }

    /// `positions[i]`: the cumulative size of every preceding node.
    fn compute_positions(&self) -> Vec<i64> {
        let mut positions = Vec::with_capacity(self.nodes.len());
        let mut running = 0i64;
        for node in &self.nodes {
            positions.push(running);
            running += node.size() as i64;
        }
        positions
    }

    /// Runs one encoding pass (Pass B, run twice by `process_nodes`): for
    /// every instruction node marked as using labels and/or arithmetic,
    /// rewrite a copy of its original text and hand it to the codec; other
    /// instruction nodes are encoded from their text unchanged.
    fn encode_pass(
        &mut self,
        code_base: i64,
        labels: &HashMap<String, LabelTarget>,
        uses_label: &[bool],
        uses_arith: &[bool],
        positions: &[i64],
        diagnostics: &mut Vec<AssembleError>,
    ) {
        for index in 0..self.nodes.len() {
            let ProgramNode::Instruction { text, line_nr, .. } = &self.nodes[index] else {
                if let ProgramNode::Macro { text, line_nr } = &self.nodes[index] {
                    info!("line {line_nr}: macro node {text:?} is reserved, contributing no bytes");
                }
                continue;
            };

            let mut rewritten = text.clone();
            let line_nr = *line_nr;

            if uses_label[index] {
                let is_relative = labels::is_relative_mnemonic(&rewritten);
                let this_position = positions[index];
                let this_size = self.nodes[index].size() as i64;
                for (name, target) in labels {
                    if labels::contains_whole_word(&rewritten, name) {
                        rewritten = labels::substitute(
                            &rewritten,
                            name,
                            *target,
                            is_relative,
                            this_position,
                            this_size,
                            code_base,
                        );
                    }
                }
            }

            if uses_arith[index] {
                match expr::evaluate(&rewritten) {
                    Ok(evaluated) => rewritten = evaluated,
                    Err(_) => {
                        let err = AssembleError::ArithmeticError { index, line_nr };
                        warn!("{err}");
                        diagnostics.push(err);
                        rewritten = text.clone();
                    }
                }
            }

            let encoded = self.codec.assemble(&rewritten);
            if encoded.is_none() {
                debug!("line {line_nr}: no template matched {rewritten:?}");
            }

            if let ProgramNode::Instruction {
                encoded_bytes,
                processed,
                ..
            } = &mut self.nodes[index]
            {
                *processed = true;
                match encoded {
                    Some(bytes) => *encoded_bytes = Some(bytes),
                    None => {
                        if encoded_bytes.is_none() {
                            diagnostics.push(AssembleError::NoTemplateMatch {
                                index,
                                line_nr,
                                text: rewritten,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Concatenates every node's encoded bytes in source order. Unprocessed
    /// or unmatched instructions contribute nothing -- call
    /// [`Self::process_nodes`] first to populate them.
    pub fn assemble(&self) -> Vec<u8> {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                ProgramNode::Instruction { encoded_bytes, .. } => encoded_bytes.clone(),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn hexify(&self) -> String {
        x86_ops::to_hex(&self.assemble())
    }
}

/// Strips a `; ...` end-of-line comment, respecting none of the operand
/// syntax -- a `;` is always a comment starter outside the instruction
/// template grammar, which is a different file format entirely.
fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Where a label's value comes from: either a node index to look up in a
/// freshly computed `positions` array, or a fixed value that never moves.
/// Kept separate from [`LabelTarget`] so the latter can stay a plain
/// by-value snapshot resolved once per pass, rather than something every
/// caller has to re-derive by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelRef {
    NodeOffset(usize),
    Fixed(i64),
}

/// Resolves every label reference against one pass's `positions` array,
/// producing the snapshot [`encode_pass`] substitutes from. Called once per
/// pass precisely because `positions` changes between passes.
fn resolve_labels(label_refs: &HashMap<String, LabelRef>, positions: &[i64]) -> HashMap<String, LabelTarget> {
    label_refs
        .iter()
        .map(|(name, reference)| {
            let target = match *reference {
                LabelRef::NodeOffset(index) => LabelTarget::Offset(positions[index]),
                LabelRef::Fixed(value) => LabelTarget::Fixed(value),
            };
            (name.clone(), target)
        })
        .collect()
}

fn data_directive_prefix(head: &str) -> Option<&'static str> {
    match head.to_ascii_lowercase().as_str() {
        "db" => Some("db"),
        "dw" => Some("dw"),
        "dd" => Some("dd"),
        "dq" => Some("dq"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler() -> Assembler {
        Assembler::new(Codec::new())
    }

    #[test]
    fn classifies_a_label_and_trailing_instruction_on_one_line() {
        let mut asm = assembler();
        asm.parse_lines("start: mov eax, 0x10\n");
        assert_eq!(asm.nodes().len(), 2);
        assert!(matches!(&asm.nodes()[0], ProgramNode::Label { name, .. } if name == "start"));
        assert!(matches!(&asm.nodes()[1], ProgramNode::Instruction { .. }));
    }

    #[test]
    fn strips_trailing_comments_before_classifying() {
        let mut asm = assembler();
        asm.parse_lines("nop ; this is a comment\n");
        assert_eq!(asm.nodes().len(), 1);
        assert_eq!(asm.nodes()[0].as_instruction_text(), Some("nop"));
    }

    #[test]
    fn expands_a_data_directive_into_one_node_per_value() {
        let mut asm = assembler();
        asm.parse_lines("db 0x12, 0x34, 0x56\n");
        assert_eq!(asm.nodes().len(), 3);
        assert_eq!(asm.nodes()[0].as_instruction_text(), Some("db 0x12"));
        assert_eq!(asm.nodes()[2].as_instruction_text(), Some("db 0x56"));
    }

    #[test]
    fn rejects_a_line_with_more_than_one_colon() {
        let mut asm = assembler();
        asm.parse_lines("a: b: nop\n");
        assert!(asm.nodes().is_empty());
    }

    #[test]
    fn macro_line_is_reserved_and_contributes_nothing() {
        let mut asm = assembler();
        asm.parse_lines("start:\n#custom_macro arg1 arg2\nnop\n");
        asm.process_nodes(0);
        assert_eq!(asm.hexify(), "90");
    }

    #[test]
    fn short_backward_jump_to_self_assembles_to_two_bytes() {
        let mut asm = assembler();
        asm.parse_lines("L:\njmp L\n");
        asm.process_nodes(0x401000);
        assert_eq!(asm.hexify(), "ebfe");
    }

    #[test]
    fn duplicate_labels_are_reported_but_do_not_abort_assembly() {
        let mut asm = assembler();
        asm.parse_lines("a:\nnop\na:\nnop\n");
        let diagnostics = asm.process_nodes(0);
        assert!(diagnostics
            .iter()
            .any(|d| matches!(d, AssembleError::DuplicateLabel { name, .. } if name == "a")));
        assert_eq!(asm.hexify(), "9090");
    }

    #[test]
    fn arithmetic_in_an_immediate_operand_is_evaluated_before_encoding() {
        let mut asm = assembler();
        asm.parse_lines("mov eax, 2*3+0x10\n");
        asm.process_nodes(0);
        assert_eq!(asm.hexify(), x86_ops::Codec::new().assemble_hex("mov eax, 22").unwrap());
    }

    #[test]
    fn running_process_nodes_twice_is_idempotent() {
        let mut asm = assembler();
        asm.parse_lines("start:\nmov eax, start\njmp start\n");
        asm.process_nodes(0x1000);
        let first = asm.hexify();
        asm.process_nodes(0x1000);
        let second = asm.hexify();
        assert_eq!(first, second);
    }

    #[test]
    fn address_label_resolves_to_a_fixed_value_unaffected_by_code_base() {
        let mut asm = assembler();
        asm.bind_address("port", 0x3f8);
        asm.parse_lines("mov eax, port\n");
        asm.process_nodes(0x401000);
        assert_eq!(
            asm.hexify(),
            x86_ops::Codec::new().assemble_hex("mov eax, 0x3f8").unwrap()
        );
    }
}
