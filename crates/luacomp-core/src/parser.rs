//! Tree-sitter front end.
//!
//! Lowers the concrete tree produced by `tree-sitter-lua` into the flat
//! [`Nodes`](crate::syntax::Nodes) representation, reporting scope opens,
//! identifier bindings, and node creation to a [`ParseSink`] in source order.
//! Tree-sitter is error tolerant, so sources with syntax errors (including
//! the placeholder-spliced buffers the completion engine produces) still
//! yield a usable tree.

use thiserror::Error;
use tree_sitter::Node;

use crate::syntax::{Binding, Indexer, NodeId, NodeKind, ParseSink, ScopeKind};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to load Lua grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),
    #[error("tree-sitter returned no parse tree")]
    NoTree,
}

pub struct LuaParser {
    parser: tree_sitter::Parser,
}

impl LuaParser {
    pub fn new() -> Result<Self, ParseError> {
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&tree_sitter_lua::LANGUAGE.into())?;
        Ok(Self { parser })
    }

    /// Parse `source` and stream the lowering into `sink`. Returns the id of
    /// the chunk node, which is always the last node created.
    pub fn parse<S: ParseSink>(&mut self, source: &str, sink: &mut S) -> Result<NodeId, ParseError> {
        let tree = self.parser.parse(source, None).ok_or(ParseError::NoTree)?;
        let mut walker = Walker {
            source,
            sink,
            frames: vec![Vec::new()],
        };
        for child in named_children(tree.root_node()) {
            walker.statement(child);
        }
        let returns = walker.frames.pop().unwrap_or_default();
        Ok(walker.sink.node_created(NodeKind::Chunk { returns }))
    }
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

struct Walker<'a, S: ParseSink> {
    source: &'a str,
    sink: &'a mut S,
    /// Return statements of each enclosing function, innermost last. The
    /// outermost frame belongs to the chunk.
    frames: Vec<Vec<NodeId>>,
}

impl<S: ParseSink> Walker<'_, S> {
    fn text(&self, node: Node<'_>) -> &str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    /// Content of a string literal node, without the quotes.
    fn string_value(&self, node: Node<'_>) -> String {
        named_children(node)
            .into_iter()
            .find(|c| c.kind() == "string_content")
            .map(|c| self.text(c).to_string())
            .unwrap_or_default()
    }

    fn statement(&mut self, node: Node<'_>) {
        match node.kind() {
            "variable_declaration" => self.local_declaration(node),
            "assignment_statement" => {
                self.assignment(node);
            }
            "function_declaration" => {
                self.function_declaration(node);
            }
            "function_call" => {
                self.expression(node);
            }
            "return_statement" => {
                let values = self.expression_list(node);
                let id = self.sink.node_created(NodeKind::Return { values });
                if let Some(frame) = self.frames.last_mut() {
                    frame.push(id);
                }
            }
            "do_statement" => self.block(named_children(node)),
            "while_statement" => {
                for child in named_children(node) {
                    if is_statement(child.kind()) {
                        continue;
                    }
                    self.expression(child);
                }
                self.block(
                    named_children(node)
                        .into_iter()
                        .filter(|c| is_statement(c.kind()))
                        .collect(),
                );
            }
            "repeat_statement" => {
                // The until condition sees the loop body's scope.
                self.sink.scope_opened(ScopeKind::Block);
                for child in named_children(node) {
                    if is_statement(child.kind()) {
                        self.statement(child);
                    } else {
                        self.expression(child);
                    }
                }
                self.sink.scope_closed();
            }
            "if_statement" => self.if_statement(node),
            "for_statement" => self.for_statement(node),
            "comment" => {}
            _ => {
                for child in named_children(node) {
                    if is_statement(child.kind()) {
                        self.statement(child);
                    } else {
                        self.expression(child);
                    }
                }
            }
        }
    }

    /// Lower the expressions of a statement that carries an
    /// `expression_list` child (or bare expression children).
    fn expression_list(&mut self, node: Node<'_>) -> Vec<NodeId> {
        let mut values = Vec::new();
        for child in named_children(node) {
            if child.kind() == "expression_list" {
                for value in named_children(child) {
                    values.push(self.expression(value));
                }
            } else if !is_statement(child.kind()) && child.kind() != "comment" {
                values.push(self.expression(child));
            }
        }
        values
    }

    fn block(&mut self, statements: Vec<Node<'_>>) {
        self.sink.scope_opened(ScopeKind::Block);
        for child in statements {
            self.statement(child);
        }
        self.sink.scope_closed();
    }

    fn if_statement(&mut self, node: Node<'_>) {
        let mut body = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "elseif_statement" | "else_statement" => {
                    self.block(std::mem::take(&mut body));
                    for inner in named_children(child) {
                        if is_statement(inner.kind()) {
                            body.push(inner);
                        } else {
                            self.expression(inner);
                        }
                    }
                }
                kind if is_statement(kind) => body.push(child),
                _ => {
                    self.expression(child);
                }
            }
        }
        self.block(body);
    }

    fn for_statement(&mut self, node: Node<'_>) {
        let mut loop_names = Vec::new();
        let mut body = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "for_numeric_clause" | "for_generic_clause" => {
                    for inner in named_children(child) {
                        match inner.kind() {
                            "identifier" => loop_names.push(self.text(inner).to_string()),
                            "name_list" | "variable_list" => {
                                for name in named_children(inner) {
                                    if name.kind() == "identifier" {
                                        loop_names.push(self.text(name).to_string());
                                    }
                                }
                            }
                            // Range bounds and iterator expressions are
                            // evaluated in the enclosing scope.
                            _ => {
                                self.expression(inner);
                            }
                        }
                    }
                }
                kind if is_statement(kind) => body.push(child),
                _ => {
                    self.expression(child);
                }
            }
        }
        self.sink.scope_opened(ScopeKind::Block);
        for name in &loop_names {
            self.sink.identifier_bound(name, Binding::Local);
        }
        for child in body {
            self.statement(child);
        }
        self.sink.scope_closed();
    }

    /// `local a, b = x, y` or bare `local a, b`. Values are lowered before
    /// the names are bound, so initializers see the outer binding of a
    /// shadowed name.
    fn local_declaration(&mut self, node: Node<'_>) {
        let mut target_names: Vec<String> = Vec::new();
        let mut value_nodes = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "assignment_statement" => {
                    for part in named_children(child) {
                        match part.kind() {
                            "variable_list" | "name_list" => {
                                for name in named_children(part) {
                                    if name.kind() == "identifier" {
                                        target_names.push(self.text(name).to_string());
                                    }
                                }
                            }
                            "expression_list" => value_nodes.extend(named_children(part)),
                            _ => {}
                        }
                    }
                }
                "variable_list" | "name_list" => {
                    for name in named_children(child) {
                        if name.kind() == "identifier" {
                            target_names.push(self.text(name).to_string());
                        }
                    }
                }
                "identifier" => target_names.push(self.text(child).to_string()),
                _ => {}
            }
        }

        let values: Vec<NodeId> = value_nodes.into_iter().map(|v| self.expression(v)).collect();
        let mut targets = Vec::new();
        for name in &target_names {
            self.sink.identifier_bound(name, Binding::Local);
            targets.push(
                self.sink
                    .node_created(NodeKind::Identifier { name: name.clone() }),
            );
        }
        self.sink
            .node_created(NodeKind::LocalDeclaration { targets, values });
    }

    fn assignment(&mut self, node: Node<'_>) -> NodeId {
        let mut target_nodes = Vec::new();
        let mut value_nodes = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "variable_list" => target_nodes.extend(named_children(child)),
                "expression_list" => value_nodes.extend(named_children(child)),
                _ => {}
            }
        }
        let values: Vec<NodeId> = value_nodes.into_iter().map(|v| self.expression(v)).collect();
        let targets: Vec<NodeId> = target_nodes.into_iter().map(|t| self.expression(t)).collect();
        self.sink.node_created(NodeKind::Assignment { targets, values })
    }

    fn function_declaration(&mut self, node: Node<'_>) -> NodeId {
        let mut is_local = false;
        let mut name_node = None;
        let mut params_node = None;
        let mut body = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "local" => is_local = true,
                "identifier" | "dot_index_expression" | "method_index_expression"
                    if name_node.is_none() =>
                {
                    name_node = Some(child);
                }
                "parameters" => params_node = Some(child),
                kind if is_statement(kind) => body.push(child),
                _ => {}
            }
        }

        let is_method = name_node.map_or(false, |n| n.kind() == "method_index_expression");
        if is_local {
            if let Some(name) = name_node {
                // local function f: f is in scope inside its own body
                let name = self.text(name).to_string();
                self.sink.identifier_bound(&name, Binding::Local);
            }
        }
        let name_id = name_node.map(|n| self.expression(n));

        self.sink.scope_opened(ScopeKind::Function {
            name: name_id,
            is_method,
        });
        self.frames.push(Vec::new());

        let mut params = Vec::new();
        let mut index = 0usize;
        if is_method {
            self.sink.identifier_bound("self", Binding::Parameter { index });
            params.push("self".to_string());
            index += 1;
        }
        if let Some(list) = params_node {
            for param in named_children(list) {
                let name = match param.kind() {
                    "identifier" => self.text(param).to_string(),
                    "vararg_expression" => "...".to_string(),
                    _ => continue,
                };
                self.sink.identifier_bound(&name, Binding::Parameter { index });
                params.push(name);
                index += 1;
            }
        }

        for child in body {
            self.statement(child);
        }

        let returns = self.frames.pop().unwrap_or_default();
        self.sink.scope_closed();
        self.sink.node_created(NodeKind::Function {
            name: name_id,
            params,
            is_method,
            returns,
        })
    }

    fn expression(&mut self, node: Node<'_>) -> NodeId {
        match node.kind() {
            "identifier" => self.sink.node_created(NodeKind::Identifier {
                name: self.text(node).to_string(),
            }),
            "number" => self.sink.node_created(NodeKind::NumberLiteral),
            "string" => {
                let value = self.string_value(node);
                self.sink.node_created(NodeKind::StringLiteral { value })
            }
            "nil" => self.sink.node_created(NodeKind::NilLiteral),
            "true" | "false" => self.sink.node_created(NodeKind::BooleanLiteral),
            "vararg_expression" => self.sink.node_created(NodeKind::Vararg),
            "dot_index_expression" => self.index_expression(node, Indexer::Dot),
            "method_index_expression" => self.index_expression(node, Indexer::Colon),
            "bracket_index_expression" => {
                let children = named_children(node);
                let base = children
                    .first()
                    .map(|c| self.expression(*c))
                    .unwrap_or_else(|| self.sink.node_created(NodeKind::Unhandled));
                let index = children
                    .get(1)
                    .map(|c| self.expression(*c))
                    .unwrap_or_else(|| self.sink.node_created(NodeKind::Unhandled));
                self.sink.node_created(NodeKind::Index { base, index })
            }
            "function_call" => self.call(node),
            "function_definition" => self.function_declaration(node),
            "parenthesized_expression" => named_children(node)
                .into_iter()
                .next()
                .map(|c| self.expression(c))
                .unwrap_or_else(|| self.sink.node_created(NodeKind::Unhandled)),
            "table_constructor" => self.table_constructor(node),
            _ => {
                for child in named_children(node) {
                    self.expression(child);
                }
                self.sink.node_created(NodeKind::Unhandled)
            }
        }
    }

    fn index_expression(&mut self, node: Node<'_>, indexer: Indexer) -> NodeId {
        let children = named_children(node);
        let base = children
            .first()
            .map(|c| self.expression(*c))
            .unwrap_or_else(|| self.sink.node_created(NodeKind::Unhandled));
        let name = children
            .get(1)
            .map(|c| self.text(*c).to_string())
            .unwrap_or_default();
        self.sink.node_created(NodeKind::Member {
            base,
            indexer,
            name,
        })
    }

    fn call(&mut self, node: Node<'_>) -> NodeId {
        let mut base = None;
        let mut args = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "arguments" => {
                    for arg in named_children(child) {
                        args.push(self.expression(arg));
                    }
                }
                // f "literal" and f { ... } call sugar
                "string" | "table_constructor" if base.is_some() => {
                    args.push(self.expression(child));
                }
                _ if base.is_none() => base = Some(self.expression(child)),
                _ => {
                    args.push(self.expression(child));
                }
            }
        }
        let base = base.unwrap_or_else(|| self.sink.node_created(NodeKind::Unhandled));
        self.sink.node_created(NodeKind::Call { base, args })
    }

    fn table_constructor(&mut self, node: Node<'_>) -> NodeId {
        let mut entries = Vec::new();
        for field in named_children(node) {
            if field.kind() != "field" {
                continue;
            }
            let mut cursor = field.walk();
            let has_bracket_key = field.children(&mut cursor).any(|c| c.kind() == "[");
            let children = named_children(field);
            match children.as_slice() {
                [key, value] if !has_bracket_key && key.kind() == "identifier" => {
                    let name = self.text(*key).to_string();
                    let id = self.expression(*value);
                    entries.push((Some(name), id));
                }
                // ["key"] = value with a string-literal key is a named member
                [key, value] if has_bracket_key && key.kind() == "string" => {
                    let name = self.string_value(*key);
                    let id = self.expression(*value);
                    entries.push((Some(name), id));
                }
                [key, value] => {
                    self.expression(*key);
                    let id = self.expression(*value);
                    entries.push((None, id));
                }
                [value] => {
                    let id = self.expression(*value);
                    entries.push((None, id));
                }
                _ => {}
            }
        }
        self.sink.node_created(NodeKind::TableConstructor { entries })
    }
}

fn is_statement(kind: &str) -> bool {
    matches!(
        kind,
        // Bodies arrive wrapped in a `block` node.
        "block"
            | "variable_declaration"
            | "assignment_statement"
            | "function_declaration"
            | "function_call"
            | "return_statement"
            | "do_statement"
            | "while_statement"
            | "repeat_statement"
            | "if_statement"
            | "for_statement"
            | "goto_statement"
            | "label_statement"
            | "break_statement"
            | "empty_statement"
    )
}
