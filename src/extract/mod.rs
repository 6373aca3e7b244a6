//! Entity extraction from source files
//!
//! Walks the tree-sitter AST of one file and reduces it to a
//! [`CodeStructure`]: package, types (with fields and methods), functions
//! (with parameters), imports, call sites, and type-usage edges. Extraction
//! is a pure function of file contents and relative path — the same input
//! always yields the same entity set, which is what makes identifiers stable
//! across builds.
//!
//! Split into submodules:
//! - `types` — entity data structures and error types
//! - `typeref` — type-expression parsing and import classification

pub mod types;
mod typeref;

pub use types::{
    CallEntity, CodeStructure, ExtractError, FunctionEntity, ImportEntity, MethodSignature,
    PackageEntity, ParameterEntity, TypeEntity, TypeField, TypeKind, TypeReference, TypeUsage,
    UsageContext,
};

use std::collections::HashMap;
use std::path::Path;

use tree_sitter::Node;

use crate::language::go::BUILTIN_FUNCS;
use crate::language::Language;

use typeref::{classify_import, is_builtin, node_text, parse_type_expr, qualify};

/// Maximum file size to extract (1MB) — larger files are skipped
const MAX_FILE_SIZE: u64 = 1_048_576;

/// Entity extractor for supported source files
///
/// Stateless: a fresh tree-sitter parser is created per call so extraction
/// can run on multiple files in parallel.
///
/// # Example
///
/// ```no_run
/// use codegraph::Extractor;
/// use std::path::Path;
///
/// let extractor = Extractor::new()?;
/// let structure = extractor.extract_file(Path::new("."), Path::new("server/handler.go"))?;
/// println!("{}: {} functions", structure.file, structure.functions.len());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct Extractor;

// Note: Default impl intentionally omitted; use Extractor::new() so grammar
// loading failures surface as Results.

impl Extractor {
    /// Create a new extractor, verifying the grammar loads
    pub fn new() -> Result<Self, ExtractError> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&Language::Go.grammar())
            .map_err(|e| ExtractError::ParseFailed(format!("{:?}", e)))?;
        Ok(Self)
    }

    /// Extract entities from a file on disk.
    ///
    /// `path` may be absolute or relative; it is relativized against `root`
    /// for all stored identifiers.
    pub fn extract_file(&self, root: &Path, path: &Path) -> Result<CodeStructure, ExtractError> {
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };

        match std::fs::metadata(&abs) {
            Ok(meta) if meta.len() > MAX_FILE_SIZE => {
                return Err(ExtractError::ParseFailed(format!(
                    "file too large ({} bytes): {}",
                    meta.len(),
                    abs.display()
                )));
            }
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }

        let source = match std::fs::read_to_string(&abs) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(ExtractError::ParseFailed(format!(
                    "non-UTF8 file: {}",
                    abs.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let rel = crate::rel_display(&abs, root);
        self.extract_source(&rel, &source)
    }

    /// Extract entities from in-memory source.
    ///
    /// `file` must be the relative path (forward slashes) the entities are
    /// keyed by.
    pub fn extract_source(&self, file: &str, source: &str) -> Result<CodeStructure, ExtractError> {
        let _span = tracing::info_span!("extract", file).entered();

        let ext = file.rsplit('.').next().unwrap_or("");
        let language = Language::from_extension(ext)
            .ok_or_else(|| ExtractError::UnsupportedFileType(ext.to_string()))?;

        // Normalize line endings for consistent byte offsets and hashing
        let source = source.replace("\r\n", "\n");

        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&language.grammar())
            .map_err(|e| ExtractError::ParseFailed(format!("{:?}", e)))?;
        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| ExtractError::ParseFailed(file.to_string()))?;

        let def = language.def();
        let module_path = module_path_for(file, def.root_package);
        let is_test_file = def.is_test_file(file);

        let mut walker = FileWalker {
            file,
            module_path: &module_path,
            source: &source,
            is_test_file,
            package_name: String::new(),
            aliases: HashMap::new(),
            types: Vec::new(),
            functions: Vec::new(),
            imports: Vec::new(),
            calls: Vec::new(),
            usages: Vec::new(),
        };
        walker.walk(tree.root_node());
        walker.back_link_methods();

        let package_name = if walker.package_name.is_empty() {
            module_path
                .rsplit('/')
                .next()
                .unwrap_or(&module_path)
                .to_string()
        } else {
            walker.package_name.clone()
        };

        Ok(CodeStructure {
            file: file.to_string(),
            module_path: module_path.clone(),
            language,
            is_test_file,
            content_hash: crate::hash_source(&source),
            source: source.clone(),
            package: PackageEntity {
                id: module_path.clone(),
                name: package_name,
            },
            types: walker.types,
            functions: walker.functions,
            imports: walker.imports,
            calls: walker.calls,
            usages: walker.usages,
        })
    }
}

/// Package key for a relative file path: its directory, or the designated
/// root key for files at the repository root.
fn module_path_for(file: &str, root_package: &str) -> String {
    let normalized = file.replace('\\', "/");
    match normalized.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir.to_string(),
        _ => root_package.to_string(),
    }
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}

/// Per-file AST walker accumulating extraction output
struct FileWalker<'a> {
    file: &'a str,
    module_path: &'a str,
    source: &'a str,
    is_test_file: bool,
    package_name: String,
    /// alias → import path, for type-reference resolution
    aliases: HashMap<String, String>,
    types: Vec<TypeEntity>,
    functions: Vec<FunctionEntity>,
    imports: Vec<ImportEntity>,
    calls: Vec<CallEntity>,
    usages: Vec<TypeUsage>,
}

impl<'a> FileWalker<'a> {
    fn walk(&mut self, root: Node) {
        let mut cursor = root.walk();
        // Imports first so the alias map is complete before any type
        // reference is resolved (import blocks may legally follow
        // declarations only in malformed files, but cheap to be exact)
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "package_clause" => self.visit_package(child),
                "import_declaration" => self.visit_imports(child),
                _ => {}
            }
        }
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "type_declaration" if !self.is_test_file => self.visit_type_declaration(child),
                "function_declaration" => self.visit_function(child, None),
                "method_declaration" => self.visit_method(child),
                _ => {}
            }
        }
    }

    fn visit_package(&mut self, node: Node) {
        let mut cursor = node.walk();
        if let Some(ident) = node
            .named_children(&mut cursor)
            .find(|c| c.kind() == "package_identifier")
        {
            self.package_name = node_text(ident, self.source);
        };
    }

    // ===== Imports =====

    fn visit_imports(&mut self, node: Node) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "import_spec" => self.visit_import_spec(child),
                "import_spec_list" => {
                    let mut inner = child.walk();
                    for spec in child.named_children(&mut inner) {
                        if spec.kind() == "import_spec" {
                            self.visit_import_spec(spec);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn visit_import_spec(&mut self, node: Node) {
        let Some(path_node) = node.child_by_field_name("path") else {
            return;
        };
        let raw = node_text(path_node, self.source);
        let import_path = raw.trim_matches(|c| c == '"' || c == '`').to_string();
        if import_path.is_empty() {
            return;
        }

        let alias = node
            .child_by_field_name("name")
            .map(|n| node_text(n, self.source));

        // Alias map entry: explicit alias (dot and blank imports aside),
        // else the last path segment
        let key = match alias.as_deref() {
            Some(".") | Some("_") => None,
            Some(explicit) => Some(explicit.to_string()),
            None => import_path.rsplit('/').next().map(|s| s.to_string()),
        };
        if let Some(key) = key {
            self.aliases.insert(key, import_path.clone());
        }

        let (is_standard_lib, is_external, is_relative) = classify_import(&import_path);
        self.imports.push(ImportEntity {
            id: format!("{}:{}", self.file, import_path),
            file: self.file.to_string(),
            import_path,
            line: path_node.start_position().row as u32 + 1,
            alias,
            is_standard_lib,
            is_external,
            is_relative,
        });
    }

    // ===== Types =====

    fn visit_type_declaration(&mut self, node: Node) {
        let mut cursor = node.walk();
        for spec in node.named_children(&mut cursor) {
            match spec.kind() {
                "type_spec" => self.visit_type_spec(spec),
                "type_alias" => self.visit_type_alias(spec),
                _ => {}
            }
        }
    }

    fn visit_type_spec(&mut self, spec: Node) {
        let Some(name_node) = spec.child_by_field_name("name") else {
            return;
        };
        let Some(type_node) = spec.child_by_field_name("type") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let id = format!("{}.{}", self.module_path, name);

        let mut entity = TypeEntity {
            id: id.clone(),
            name: name.clone(),
            kind: TypeKind::Alias,
            file: self.file.to_string(),
            start_line: spec.start_position().row as u32 + 1,
            end_line: spec.end_position().row as u32 + 1,
            start_byte: spec.start_byte() as u32,
            end_byte: spec.end_byte() as u32,
            module_path: self.module_path.to_string(),
            is_exported: is_exported(&name),
            fields: Vec::new(),
            methods: Vec::new(),
            resolved_methods: Vec::new(),
            embedded_types: Vec::new(),
        };

        match type_node.kind() {
            "struct_type" => {
                entity.kind = TypeKind::Struct;
                self.visit_struct_fields(type_node, &mut entity);
            }
            "interface_type" => {
                entity.kind = TypeKind::Interface;
                self.visit_interface_body(type_node, &mut entity);
            }
            _ => {
                // Nominal typedef: record the underlying type as a usage
                let underlying = parse_type_expr(type_node, self.source);
                if !is_builtin(&underlying) {
                    self.push_usage(
                        &id,
                        &underlying,
                        UsageContext::Field,
                        type_node.start_position().row as u32 + 1,
                    );
                }
            }
        }

        self.types.push(entity);
    }

    fn visit_type_alias(&mut self, spec: Node) {
        let Some(name_node) = spec.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let id = format!("{}.{}", self.module_path, name);
        if let Some(type_node) = spec.child_by_field_name("type") {
            let underlying = parse_type_expr(type_node, self.source);
            if !is_builtin(&underlying) {
                self.push_usage(
                    &id,
                    &underlying,
                    UsageContext::Field,
                    type_node.start_position().row as u32 + 1,
                );
            }
        }
        self.types.push(TypeEntity {
            id,
            name: name.clone(),
            kind: TypeKind::Alias,
            file: self.file.to_string(),
            start_line: spec.start_position().row as u32 + 1,
            end_line: spec.end_position().row as u32 + 1,
            start_byte: spec.start_byte() as u32,
            end_byte: spec.end_byte() as u32,
            module_path: self.module_path.to_string(),
            is_exported: is_exported(&name),
            fields: Vec::new(),
            methods: Vec::new(),
            resolved_methods: Vec::new(),
            embedded_types: Vec::new(),
        });
    }

    fn visit_struct_fields(&mut self, struct_node: Node, entity: &mut TypeEntity) {
        let mut list_cursor = struct_node.walk();
        let Some(list) = struct_node
            .named_children(&mut list_cursor)
            .find(|c| c.kind() == "field_declaration_list")
        else {
            return;
        };

        let mut position = 0u32;
        let mut cursor = list.walk();
        for decl in list.named_children(&mut cursor) {
            if decl.kind() != "field_declaration" {
                continue;
            }
            let Some(type_node) = decl.child_by_field_name("type") else {
                continue;
            };
            let declared_type = node_text(type_node, self.source);
            let type_ref = parse_type_expr(type_node, self.source);
            let line = type_node.start_position().row as u32 + 1;

            let mut name_cursor = decl.walk();
            let names: Vec<String> = decl
                .children_by_field_name("name", &mut name_cursor)
                .map(|n| node_text(n, self.source))
                .collect();

            if names.is_empty() {
                // Embedded field: empty name, qualified target recorded
                entity.fields.push(TypeField {
                    name: String::new(),
                    declared_type: declared_type.clone(),
                    position,
                    is_method: false,
                    param_count: None,
                    return_count: None,
                });
                position += 1;
                if !is_builtin(&type_ref) {
                    entity
                        .embedded_types
                        .push(qualify(&type_ref, self.module_path, &self.aliases));
                }
            } else {
                // Grouped declarations explode into one field per name
                for name in names {
                    entity.fields.push(TypeField {
                        name,
                        declared_type: declared_type.clone(),
                        position,
                        is_method: false,
                        param_count: None,
                        return_count: None,
                    });
                    position += 1;
                }
            }

            if !is_builtin(&type_ref) {
                self.push_usage(&entity.id, &type_ref, UsageContext::Field, line);
            }
        }
    }

    fn visit_interface_body(&mut self, iface_node: Node, entity: &mut TypeEntity) {
        let mut position = 0u32;
        let mut cursor = iface_node.walk();
        for elem in iface_node.named_children(&mut cursor) {
            self.visit_interface_elem(elem, entity, &mut position);
        }
    }

    fn visit_interface_elem(&mut self, elem: Node, entity: &mut TypeEntity, position: &mut u32) {
        match elem.kind() {
            // tree-sitter-go ≥0.20 uses method_elem; older grammars method_spec
            "method_elem" | "method_spec" => {
                let Some(name_node) = elem.child_by_field_name("name") else {
                    return;
                };
                let name = node_text(name_node, self.source);
                let params = elem
                    .child_by_field_name("parameters")
                    .map(|p| self.parse_parameter_group(p, false))
                    .unwrap_or_default();
                let returns = self.parse_result(elem);

                for p in params.iter().chain(returns.iter()) {
                    if !is_builtin(&p.type_ref) {
                        self.push_usage(
                            &entity.id,
                            &p.type_ref,
                            UsageContext::Signature,
                            elem.start_position().row as u32 + 1,
                        );
                    }
                }

                entity.fields.push(TypeField {
                    name: name.clone(),
                    declared_type: "func".to_string(),
                    position: *position,
                    is_method: true,
                    param_count: Some(params.len() as u32),
                    return_count: Some(returns.len() as u32),
                });
                *position += 1;

                entity.methods.push(MethodSignature {
                    name,
                    params: params.into_iter().map(|p| p.type_ref).collect(),
                    returns: returns.into_iter().map(|p| p.type_ref).collect(),
                });
            }
            // Embedded interface: positional unnamed field with the
            // qualified name of the embedded type
            "type_elem" => {
                let mut cursor = elem.walk();
                for term in elem.named_children(&mut cursor) {
                    if matches!(term.kind(), "type_identifier" | "qualified_type") {
                        self.push_embedded(term, entity, position);
                    }
                }
            }
            "type_identifier" | "qualified_type" | "interface_type_name" => {
                self.push_embedded(elem, entity, position);
            }
            "method_spec_list" => {
                let mut cursor = elem.walk();
                for inner in elem.named_children(&mut cursor) {
                    self.visit_interface_elem(inner, entity, position);
                }
            }
            _ => {}
        }
    }

    fn push_embedded(&mut self, node: Node, entity: &mut TypeEntity, position: &mut u32) {
        let type_ref = parse_type_expr(node, self.source);
        if is_builtin(&type_ref) {
            return;
        }
        let qualified = qualify(&type_ref, self.module_path, &self.aliases);
        entity.fields.push(TypeField {
            name: String::new(),
            declared_type: qualified.clone(),
            position: *position,
            is_method: false,
            param_count: None,
            return_count: None,
        });
        *position += 1;
        entity.embedded_types.push(qualified);
    }

    // ===== Functions =====

    fn visit_function(&mut self, node: Node, receiver: Option<(String, Option<String>)>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);

        let (id, is_method, receiver_type_name, receiver_type_id) = match receiver {
            Some((recv_name, recv_id)) => (
                format!("{}.{}.{}", self.module_path, recv_name, name),
                true,
                Some(recv_name),
                recv_id,
            ),
            None => (
                format!("{}.{}", self.module_path, name),
                false,
                None,
                None,
            ),
        };

        let mut parameters = node
            .child_by_field_name("parameters")
            .map(|p| self.parse_parameter_group(p, false))
            .unwrap_or_default();
        parameters.extend(self.parse_result(node));

        for p in &parameters {
            if is_builtin(&p.type_ref) {
                continue;
            }
            let context = if p.is_return {
                UsageContext::Return
            } else {
                UsageContext::Parameter
            };
            self.push_usage(
                &id,
                &p.type_ref,
                context,
                node.start_position().row as u32 + 1,
            );
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.collect_calls(body, &id);
        }

        self.functions.push(FunctionEntity {
            id,
            name: name.clone(),
            file: self.file.to_string(),
            start_line: node.start_position().row as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
            start_byte: node.start_byte() as u32,
            end_byte: node.end_byte() as u32,
            module_path: self.module_path.to_string(),
            is_exported: is_exported(&name),
            is_method,
            receiver_type_id,
            receiver_type_name,
            parameters,
        });
    }

    fn visit_method(&mut self, node: Node) {
        let receiver = node
            .child_by_field_name("receiver")
            .and_then(|r| self.receiver_type_name(r));
        let Some(recv_name) = receiver else {
            return;
        };
        // Pointer and value receivers share the same id; methods declared
        // in test files carry no receiver id (the type is not extracted)
        let recv_id = if self.is_test_file {
            None
        } else {
            Some(format!("{}.{}", self.module_path, recv_name))
        };
        self.visit_function(node, Some((recv_name, recv_id)));
    }

    /// Base type name of a method receiver (`(s *Server)` → `Server`)
    fn receiver_type_name(&self, receiver: Node) -> Option<String> {
        let mut cursor = receiver.walk();
        let decl = receiver
            .named_children(&mut cursor)
            .find(|c| c.kind() == "parameter_declaration")?;
        let type_node = decl.child_by_field_name("type")?;
        let type_ref = parse_type_expr(type_node, self.source);
        Some(type_ref.name)
    }

    /// Parse a `parameter_list` into entities; positions number from zero
    /// within the group.
    fn parse_parameter_group(&self, list: Node, is_return: bool) -> Vec<ParameterEntity> {
        let mut out = Vec::new();
        let mut position = 0u32;
        let mut cursor = list.walk();
        for decl in list.named_children(&mut cursor) {
            match decl.kind() {
                "parameter_declaration" => {
                    let Some(type_node) = decl.child_by_field_name("type") else {
                        continue;
                    };
                    let declared_type = node_text(type_node, self.source);
                    let type_ref = parse_type_expr(type_node, self.source);

                    let mut name_cursor = decl.walk();
                    let names: Vec<String> = decl
                        .children_by_field_name("name", &mut name_cursor)
                        .map(|n| node_text(n, self.source))
                        .collect();

                    if names.is_empty() {
                        out.push(ParameterEntity {
                            name: None,
                            declared_type,
                            type_ref,
                            position,
                            is_return,
                            is_variadic: false,
                        });
                        position += 1;
                    } else {
                        for name in names {
                            out.push(ParameterEntity {
                                name: Some(name),
                                declared_type: declared_type.clone(),
                                type_ref: type_ref.clone(),
                                position,
                                is_return,
                                is_variadic: false,
                            });
                            position += 1;
                        }
                    }
                }
                "variadic_parameter_declaration" => {
                    let Some(type_node) = decl.child_by_field_name("type") else {
                        continue;
                    };
                    let inner = parse_type_expr(type_node, self.source);
                    // Variadic is slice-shaped for signature matching
                    let type_ref = TypeReference {
                        is_slice: true,
                        ..inner
                    };
                    let name = decl
                        .child_by_field_name("name")
                        .map(|n| node_text(n, self.source));
                    out.push(ParameterEntity {
                        name,
                        declared_type: format!("...{}", node_text(type_node, self.source)),
                        type_ref,
                        position,
                        is_return,
                        is_variadic: true,
                    });
                    position += 1;
                }
                _ => {}
            }
        }
        out
    }

    /// Parse the `result` field: either a parameter list or a single bare type.
    fn parse_result(&self, node: Node) -> Vec<ParameterEntity> {
        let Some(result) = node.child_by_field_name("result") else {
            return Vec::new();
        };
        if result.kind() == "parameter_list" {
            return self.parse_parameter_group(result, true);
        }
        vec![ParameterEntity {
            name: None,
            declared_type: node_text(result, self.source),
            type_ref: parse_type_expr(result, self.source),
            position: 0,
            is_return: true,
            is_variadic: false,
        }]
    }

    // ===== Calls =====

    /// Recursive descent over a function body, one call entity per call
    /// expression. Calls inside nested function literals attribute to the
    /// enclosing named function.
    fn collect_calls(&mut self, node: Node, caller_id: &str) {
        if node.kind() == "call_expression" {
            if let Some(callee_name) = self.callee_name(node) {
                self.calls.push(CallEntity {
                    caller_id: caller_id.to_string(),
                    callee_id: None,
                    callee_name,
                    file: self.file.to_string(),
                    line: node.start_position().row as u32 + 1,
                    column: Some(node.start_position().column as u32 + 1),
                });
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.collect_calls(child, caller_id);
        }
    }

    /// Callee name from the call's function expression:
    /// bare identifier → `{package}.{name}`; selector chains → literal text;
    /// calls on anonymous functions are skipped.
    fn callee_name(&self, call: Node) -> Option<String> {
        let mut func = call.child_by_field_name("function")?;
        while func.kind() == "parenthesized_expression" {
            func = func.named_children(&mut func.walk()).next()?;
        }
        match func.kind() {
            "identifier" => {
                let name = node_text(func, self.source);
                if BUILTIN_FUNCS.contains(name.as_str()) {
                    return None;
                }
                Some(format!("{}.{}", self.module_path, name))
            }
            "selector_expression" => Some(node_text(func, self.source)),
            // f[T](x): unwrap the generic instantiation to its operand
            "index_expression" | "generic_function" => {
                let operand = func
                    .child_by_field_name("operand")
                    .or_else(|| func.child_by_field_name("function"))
                    .or_else(|| func.named_children(&mut func.walk()).next())?;
                match operand.kind() {
                    "identifier" => {
                        let name = node_text(operand, self.source);
                        if BUILTIN_FUNCS.contains(name.as_str()) {
                            return None;
                        }
                        Some(format!("{}.{}", self.module_path, name))
                    }
                    "selector_expression" => Some(node_text(operand, self.source)),
                    _ => None,
                }
            }
            // Anonymous functions and computed callees are skipped
            _ => None,
        }
    }

    // ===== Finalization =====

    /// Append method signatures to their receiver types.
    ///
    /// Runs after the full file walk, so declaration order between types and
    /// methods does not matter.
    fn back_link_methods(&mut self) {
        let mut by_id: HashMap<&str, usize> = HashMap::new();
        for (i, t) in self.types.iter().enumerate() {
            by_id.insert(t.id.as_str(), i);
        }
        let mut appended: Vec<(usize, MethodSignature)> = Vec::new();
        for f in &self.functions {
            let Some(recv_id) = &f.receiver_type_id else {
                continue;
            };
            if let Some(&idx) = by_id.get(recv_id.as_str()) {
                appended.push((idx, f.signature()));
            }
        }
        for (idx, sig) in appended {
            let methods = &mut self.types[idx].methods;
            if !methods.contains(&sig) {
                methods.push(sig);
            }
        }
    }

    fn push_usage(&mut self, from_id: &str, type_ref: &TypeReference, context: UsageContext, line: u32) {
        self.usages.push(TypeUsage {
            from_id: from_id.to_string(),
            to_type: qualify(type_ref, self.module_path, &self.aliases),
            context,
            file: self.file.to_string(),
            line,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(file: &str, source: &str) -> CodeStructure {
        Extractor::new().unwrap().extract_source(file, source).unwrap()
    }

    #[test]
    fn test_package_keyed_by_directory() {
        let s = extract("server/handler.go", "package server\n");
        assert_eq!(s.module_path, "server");
        assert_eq!(s.package.id, "server");
        assert_eq!(s.package.name, "server");

        let root = extract("main.go", "package main\n");
        assert_eq!(root.module_path, "main");
        assert_eq!(root.package.id, "main");
    }

    #[test]
    fn test_import_classification_and_aliases() {
        let src = r#"package server

import (
    "fmt"
    "net/http"
    myio "io"
    "github.com/user/lib"
    "./local"
)
"#;
        let s = extract("server/s.go", src);
        assert_eq!(s.imports.len(), 5);

        let by_path: std::collections::HashMap<_, _> = s
            .imports
            .iter()
            .map(|i| (i.import_path.as_str(), i))
            .collect();
        assert!(by_path["fmt"].is_standard_lib);
        assert!(by_path["net/http"].is_standard_lib);
        assert!(by_path["github.com/user/lib"].is_external);
        assert!(by_path["./local"].is_relative);
        assert_eq!(by_path["io"].alias.as_deref(), Some("myio"));
        assert_eq!(by_path["fmt"].id, "server/s.go:fmt");
        assert!(by_path["fmt"].line >= 3);
    }

    #[test]
    fn test_struct_fields_grouped_and_embedded() {
        let src = r#"package data

import "sync"

type Store struct {
    sync.Mutex
    name, path string
    count      int
    handler    *Handler
}
"#;
        let s = extract("data/store.go", src);
        assert_eq!(s.types.len(), 1);
        let t = &s.types[0];
        assert_eq!(t.id, "data.Store");
        assert_eq!(t.kind, TypeKind::Struct);
        assert!(t.is_exported);

        // Embedded + exploded group + count + handler = 5 fields
        assert_eq!(t.fields.len(), 5);
        assert_eq!(t.fields[0].name, "");
        assert_eq!(t.fields[0].declared_type, "sync.Mutex");
        assert_eq!(t.fields[1].name, "name");
        assert_eq!(t.fields[2].name, "path");
        assert_eq!(t.fields[1].declared_type, "string");
        assert_eq!(t.fields[2].position, 2);
        assert_eq!(t.fields[4].declared_type, "*Handler");
        assert_eq!(t.embedded_types, vec!["sync.Mutex".to_string()]);

        // Handler is a field usage; string/int are builtin
        assert!(s
            .usages
            .iter()
            .any(|u| u.from_id == "data.Store" && u.to_type == "data.Handler"));
        assert!(!s.usages.iter().any(|u| u.to_type.ends_with(".string")));
    }

    #[test]
    fn test_interface_methods_and_embedding() {
        let src = r#"package io2

type Reader interface {
    Read(p []byte) (int, error)
}

type ReadCloser interface {
    Reader
    Close() error
}
"#;
        let s = extract("io2/io.go", src);
        assert_eq!(s.types.len(), 2);

        let reader = &s.types[0];
        assert_eq!(reader.kind, TypeKind::Interface);
        assert_eq!(reader.methods.len(), 1);
        assert_eq!(reader.methods[0].name, "Read");
        assert_eq!(reader.methods[0].params.len(), 1);
        assert!(reader.methods[0].params[0].is_slice);
        assert_eq!(reader.methods[0].returns.len(), 2);
        assert_eq!(reader.fields[0].is_method, true);
        assert_eq!(reader.fields[0].param_count, Some(1));
        assert_eq!(reader.fields[0].return_count, Some(2));

        let rc = &s.types[1];
        assert_eq!(rc.embedded_types, vec!["io2.Reader".to_string()]);
        assert_eq!(rc.methods.len(), 1);
        assert_eq!(rc.methods[0].name, "Close");
        // Embedded slot is an unnamed positional field
        assert_eq!(rc.fields[0].name, "");
        assert_eq!(rc.fields[0].declared_type, "io2.Reader");
        assert_eq!(rc.fields[1].name, "Close");
    }

    #[test]
    fn test_functions_methods_and_backlink() {
        let src = r#"package server

type Server struct {
    addr string
}

func (s *Server) Start(port int) error {
    return nil
}

func NewServer(addr string) *Server {
    return &Server{addr: addr}
}
"#;
        let s = extract("server/server.go", src);
        assert_eq!(s.functions.len(), 2);

        let start = s.functions.iter().find(|f| f.name == "Start").unwrap();
        assert_eq!(start.id, "server.Server.Start");
        assert!(start.is_method);
        assert_eq!(start.receiver_type_id.as_deref(), Some("server.Server"));
        assert_eq!(start.receiver_type_name.as_deref(), Some("Server"));
        assert_eq!(start.param_count(), 1);
        assert_eq!(start.return_count(), 1);

        let ctor = s.functions.iter().find(|f| f.name == "NewServer").unwrap();
        assert_eq!(ctor.id, "server.NewServer");
        assert!(!ctor.is_method);
        assert!(ctor.parameters.iter().any(|p| p.is_return
            && p.type_ref.is_pointer
            && p.type_ref.name == "Server"));

        // Back-link: Start appended to Server's method list
        let server = &s.types[0];
        assert_eq!(server.methods.len(), 1);
        assert_eq!(server.methods[0].name, "Start");

        // Return usage edge for *Server
        assert!(s
            .usages
            .iter()
            .any(|u| u.from_id == "server.NewServer"
                && u.to_type == "server.Server"
                && u.context == UsageContext::Return));
    }

    #[test]
    fn test_call_extraction() {
        let src = r#"package app

import "fmt"

func run() {
    setup()
    fmt.Println("hi")
    db.conn.Open()
    func() { inner() }()
    _ = len("x")
}
"#;
        let s = extract("app/run.go", src);
        let names: Vec<&str> = s.calls.iter().map(|c| c.callee_name.as_str()).collect();

        // Bare identifier qualifies with the package key
        assert!(names.contains(&"app.setup"));
        // One-level selector stays literal
        assert!(names.contains(&"fmt.Println"));
        // Deeper chains keep the full dotted text
        assert!(names.contains(&"db.conn.Open"));
        // Calls inside a func literal attribute to the enclosing function
        assert!(names.contains(&"app.inner"));
        // The immediate call of the literal itself is skipped
        assert!(!names.iter().any(|n| n.contains("func")));
        // Builtins are skipped
        assert!(!names.contains(&"app.len"));

        for c in &s.calls {
            assert_eq!(c.caller_id, "app.run");
            assert!(c.line >= 5);
            assert!(c.callee_id.is_none());
        }
    }

    #[test]
    fn test_variadic_parameter() {
        let src = r#"package util

func Join(sep string, parts ...string) string {
    return ""
}
"#;
        let s = extract("util/join.go", src);
        let f = &s.functions[0];
        let variadic = f.parameters.iter().find(|p| p.is_variadic).unwrap();
        assert!(variadic.type_ref.is_slice);
        assert_eq!(variadic.type_ref.name, "string");
        assert_eq!(variadic.declared_type, "...string");
        assert_eq!(f.param_count(), 2);
    }

    #[test]
    fn test_test_file_skips_types_keeps_functions() {
        let src = r#"package server

type mockServer struct {
    calls int
}

func (m *mockServer) Start(port int) error {
    return helper()
}

func helper() error {
    return nil
}
"#;
        let s = extract("server/server_test.go", src);
        assert!(s.is_test_file);
        assert!(s.types.is_empty(), "test files skip type extraction");
        assert_eq!(s.functions.len(), 2);

        let m = s.functions.iter().find(|f| f.name == "Start").unwrap();
        assert!(m.is_method);
        assert_eq!(m.receiver_type_name.as_deref(), Some("mockServer"));
        assert!(m.receiver_type_id.is_none(), "no declaration target in test files");

        assert!(s.calls.iter().any(|c| c.callee_name == "server.helper"));
    }

    #[test]
    fn test_alias_kind_for_typedefs() {
        let src = r#"package ids

type UserID int64

type Alias = UserID
"#;
        let s = extract("ids/ids.go", src);
        assert_eq!(s.types.len(), 2);
        assert!(s.types.iter().all(|t| t.kind == TypeKind::Alias));
        assert!(s
            .usages
            .iter()
            .any(|u| u.from_id == "ids.Alias" && u.to_type == "ids.UserID"));
    }

    #[test]
    fn test_deterministic_output() {
        let src = r#"package p

type A struct{ x int }

func F(a A) {}
"#;
        let first = extract("p/p.go", src);
        let second = extract("p/p.go", src);
        assert_eq!(first.types, second.types);
        assert_eq!(first.functions, second.functions);
        assert_eq!(first.calls, second.calls);
        assert_eq!(first.content_hash, second.content_hash);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Extractor::new()
            .unwrap()
            .extract_source("lib.rs", "fn main() {}")
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFileType(_)));
    }
}
