// src/core/call_graph/static_oracle.rs
use std::collections::HashMap;
use std::path::Path;
use async_trait::async_trait;
use tracing::{info, warn};
use tree_sitter::Node;

use crate::core::boundary::CallGuard;
use crate::core::symbols::{
    node_range, node_text, parse_blocking, parse_java, JavaSymbolProvider, Position, Range, SourceLocation,
    SymbolProvider, TYPE_DECLARATION_KINDS,
};
use crate::error::{RoutetraceError, Result};
use super::{CallGraphOracle, CallIdentity, OutgoingCall};

/// How a call site names the object it calls on
#[derive(Debug, Clone, PartialEq)]
enum Receiver {
    /// `find(id)`
    Implicit,
    /// `this.find(id)` or `super.find(id)`
    This,
    /// `userService.find(id)`, `UserService.find(id)`
    Named(String),
    /// `repository().find(id)` and other expressions
    Opaque,
}

#[derive(Debug, Clone)]
struct Invocation {
    name: String,
    receiver: Receiver,
    range: Range,
}

#[derive(Debug, Clone)]
struct IndexedMethod {
    identity: CallIdentity,
    full_range: Range,
    selection_range: Range,
    invocations: Vec<Invocation>,
}

/// Call-graph oracle computed from Java sources
///
/// Every method and constructor is indexed with the invocations in its body.
/// Invocations resolve by name, narrowed by the receiver: the caller's own type for
/// unqualified calls, the declared type of a field for `field.call()`, the type
/// itself for static calls. Calls that resolve to nothing in the corpus (JDK and
/// library calls) are dropped.
#[derive(Debug, Default)]
pub struct StaticCallGraphOracle {
    methods: Vec<IndexedMethod>,
    by_identity: HashMap<CallIdentity, usize>,
    by_name: HashMap<String, Vec<usize>>,
    /// type name -> field name -> declared type
    field_types: HashMap<String, HashMap<String, String>>,
}

impl StaticCallGraphOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every file the provider lists for `glob`
    pub async fn index(provider: &JavaSymbolProvider, glob: &str, guard: &CallGuard) -> Result<Self> {
        let files = guard.guarded("list_files", provider.list_files(glob)).await?;
        let mut oracle = Self::new();

        for file in files {
            if guard.is_cancelled() {
                return Err(RoutetraceError::Cancelled { operation: "call graph indexing".to_string() });
            }
            match Self::index_file(provider, &file, guard).await {
                Ok(partial) => oracle.absorb(partial),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => warn!("Call graph skips {}: {}", file.display(), e),
            }
        }

        info!("Indexed {} callables for the call graph", oracle.methods.len());
        Ok(oracle)
    }

    async fn index_file(provider: &JavaSymbolProvider, file: &Path, guard: &CallGuard) -> Result<Self> {
        let source = guard.guarded("open_document", provider.source(file)).await?;
        let path = file.to_path_buf();
        let parsed = parse_blocking(source, move |text| {
            let mut partial = Self::new();
            partial.index_source(&path, text)?;
            Ok(partial)
        });
        guard.guarded("index_source", parsed).await
    }

    /// Take over everything indexed by `other`
    fn absorb(&mut self, other: Self) {
        for method in other.methods {
            self.push_method(method);
        }
        for (type_name, fields) in other.field_types {
            self.field_types.entry(type_name).or_default().extend(fields);
        }
    }

    /// Add the callables of one source file
    pub fn index_source(&mut self, file: &Path, source: &str) -> Result<()> {
        let tree = parse_java(source)?;
        self.index_types(tree.root_node(), source, file);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    fn index_types(&mut self, node: Node, source: &str, file: &Path) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if TYPE_DECLARATION_KINDS.contains(&child.kind()) {
                self.index_type(child, source, file);
            } else {
                self.index_types(child, source, file);
            }
        }
    }

    fn index_type(&mut self, node: Node, source: &str, file: &Path) {
        let (Some(name_node), Some(body)) = (node.child_by_field_name("name"), node.child_by_field_name("body")) else {
            return;
        };
        let type_name = node_text(name_node, source).to_string();
        self.index_members(body, &type_name, source, file);
    }

    fn index_members(&mut self, body: Node, type_name: &str, source: &str, file: &Path) {
        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            match member.kind() {
                "method_declaration" | "constructor_declaration" => {
                    self.index_method(member, type_name, source, file);
                }
                "field_declaration" => self.index_field(member, type_name, source),
                "enum_body_declarations" => self.index_members(member, type_name, source, file),
                kind if TYPE_DECLARATION_KINDS.contains(&kind) => self.index_type(member, source, file),
                _ => {}
            }
        }
    }

    fn index_method(&mut self, node: Node, type_name: &str, source: &str, file: &Path) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let selection_range = node_range(name_node);
        let identity = CallIdentity::new(
            node_text(name_node, source),
            type_name,
            SourceLocation::new(file, selection_range.start),
        );

        let mut invocations = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            collect_invocations(body, source, &mut invocations);
        }

        self.push_method(IndexedMethod {
            identity,
            full_range: node_range(node),
            selection_range,
            invocations,
        });
    }

    fn push_method(&mut self, method: IndexedMethod) {
        let index = self.methods.len();
        self.by_identity.insert(method.identity.clone(), index);
        self.by_name.entry(method.identity.name.clone()).or_default().push(index);
        self.methods.push(method);
    }

    fn index_field(&mut self, node: Node, type_name: &str, source: &str) {
        let Some(type_node) = node.child_by_field_name("type") else {
            return;
        };
        let declared = base_type_name(node_text(type_node, source));

        let fields = self.field_types.entry(type_name.to_string()).or_default();
        let mut cursor = node.walk();
        for declarator in node.children_by_field_name("declarator", &mut cursor) {
            if let Some(name) = declarator.child_by_field_name("name") {
                fields.insert(node_text(name, source).to_string(), declared.clone());
            }
        }
    }

    /// Types a call is expected to land in, most specific first
    ///
    /// The flag marks a declared field type, the only kind that also admits an
    /// implementation named after it (`UserService` field backed by `UserServiceImpl`).
    fn receiver_types(&self, caller: &IndexedMethod, receiver: &Receiver) -> Vec<(String, bool)> {
        let caller_type = &caller.identity.context;
        match receiver {
            Receiver::Implicit | Receiver::This => vec![(caller_type.clone(), false)],
            Receiver::Named(name) => {
                let mut types = Vec::new();
                if let Some(declared) = self.field_types.get(caller_type).and_then(|f| f.get(name)) {
                    types.push((declared.clone(), true));
                }
                if name.starts_with(|c: char| c.is_ascii_uppercase()) {
                    types.push((name.clone(), false));
                } else {
                    types.push((capitalize(name), false));
                }
                types
            }
            Receiver::Opaque => Vec::new(),
        }
    }

    fn resolve(&self, caller: &IndexedMethod, invocation: &Invocation) -> Option<usize> {
        let candidates = self.by_name.get(&invocation.name)?;

        for (expected, declared) in self.receiver_types(caller, &invocation.receiver) {
            let context = |i: usize| self.methods[i].identity.context.as_str();
            let exact = candidates.iter().find(|&&i| context(i) == expected);
            let derived = || {
                candidates.iter()
                    .filter(|_| declared)
                    .find(|&&i| context(i).starts_with(&expected))
            };
            if let Some(&index) = exact.or_else(derived) {
                return Some(index);
            }
        }

        // An unqualified call to the only method of that name, e.g. an inherited helper
        if invocation.receiver == Receiver::Implicit && candidates.len() == 1 {
            return Some(candidates[0]);
        }

        None
    }
}

#[async_trait]
impl CallGraphOracle for StaticCallGraphOracle {
    async fn prepare(&self, file: &Path, position: Position) -> Result<Vec<CallIdentity>> {
        let in_file: Vec<&IndexedMethod> = self.methods.iter()
            .filter(|m| m.identity.location.file.as_path() == file)
            .collect();

        let on_name = in_file.iter().find(|m| m.selection_range.contains(position));
        let innermost = || {
            in_file.iter()
                .filter(|m| m.full_range.contains(position))
                .min_by_key(|m| m.full_range.line_span())
        };

        Ok(on_name.or_else(innermost)
            .map(|m| vec![m.identity.clone()])
            .unwrap_or_default())
    }

    async fn outgoing_calls(&self, identity: &CallIdentity) -> Result<Vec<OutgoingCall>> {
        let &index = self.by_identity.get(identity).ok_or_else(|| {
            RoutetraceError::collaborator(
                "outgoing_calls",
                format!("unknown callable {} at {}", identity.name, identity.location),
            )
        })?;
        let caller = &self.methods[index];

        let mut calls: Vec<OutgoingCall> = Vec::new();
        for invocation in &caller.invocations {
            let Some(target) = self.resolve(caller, invocation) else {
                continue;
            };
            let callee = &self.methods[target].identity;
            match calls.iter_mut().find(|c| &c.callee == callee) {
                Some(existing) => existing.call_sites.push(invocation.range),
                None => calls.push(OutgoingCall {
                    callee: callee.clone(),
                    call_sites: vec![invocation.range],
                }),
            }
        }

        Ok(calls)
    }
}

/// Method invocations under `node` in source order
fn collect_invocations(node: Node, source: &str, invocations: &mut Vec<Invocation>) {
    if node.kind() == "method_invocation" {
        if let Some(name) = node.child_by_field_name("name") {
            let receiver = match node.child_by_field_name("object") {
                None => Receiver::Implicit,
                Some(object) => receiver_of(node_text(object, source)),
            };
            invocations.push(Invocation {
                name: node_text(name, source).to_string(),
                receiver,
                range: node_range(node),
            });
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_invocations(child, source, invocations);
    }
}

fn receiver_of(object: &str) -> Receiver {
    let object = object.trim();
    let name = object.strip_prefix("this.").unwrap_or(object).trim();

    if name == "this" || name == "super" {
        Receiver::This
    } else if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
        Receiver::Named(name.to_string())
    } else {
        Receiver::Opaque
    }
}

/// `List<User>` -> `List`, `com.acme.UserService` -> `UserService`
fn base_type_name(declared: &str) -> String {
    let without_generics = declared.split('<').next().unwrap_or(declared).trim();
    let without_array = without_generics.trim_end_matches("[]");
    without_array.rsplit('.').next().unwrap_or(without_array).to_string()
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const CONTROLLER: &str = r#"
@RestController
public class UserController {
    private final UserService userService;

    @GetMapping("/{id}")
    public User get(long id) {
        audit(id);
        User user = userService.find(id);
        userService.find(id + 1);
        List<String> names = new ArrayList<>();
        names.add(user.getName());
        return user;
    }

    private void audit(long id) {
        Log.write("get " + id);
    }
}
"#;

    const SERVICE: &str = r#"
public class UserServiceImpl {
    private UserRepository repository;

    public User find(long id) {
        return this.repository.load(id);
    }
}

class UserRepository {
    User load(long id) { return reload(id); }
    User reload(long id) { return load(id); }
}

class Log {
    static void write(String message) {}
}
"#;

    fn oracle() -> StaticCallGraphOracle {
        let mut oracle = StaticCallGraphOracle::new();
        oracle.index_source(Path::new("UserController.java"), CONTROLLER).unwrap();
        oracle.index_source(Path::new("UserService.java"), SERVICE).unwrap();
        oracle
    }

    async fn callees(oracle: &StaticCallGraphOracle, identity: &CallIdentity) -> Vec<String> {
        oracle.outgoing_calls(identity).await.unwrap()
            .into_iter()
            .map(|c| format!("{}.{}", c.callee.context, c.callee.name))
            .collect()
    }

    #[tokio::test]
    async fn test_prepare_on_name_and_inside_body() {
        let oracle = oracle();
        let file = PathBuf::from("UserController.java");

        let on_name = oracle.prepare(&file, Position::new(6, 16)).await.unwrap();
        assert_eq!(on_name.len(), 1);
        assert_eq!(on_name[0].name, "get");
        assert_eq!(on_name[0].context, "UserController");

        let in_body = oracle.prepare(&file, Position::new(16, 8)).await.unwrap();
        assert_eq!(in_body[0].name, "audit");

        let outside = oracle.prepare(&file, Position::new(3, 4)).await.unwrap();
        assert!(outside.is_empty());
        assert!(oracle.prepare(Path::new("Other.java"), Position::new(6, 16)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outgoing_calls_resolve_receivers() {
        let oracle = oracle();
        let get = oracle.prepare(Path::new("UserController.java"), Position::new(6, 16)).await.unwrap().remove(0);

        // library calls (names.add, user.getName) are dropped, repeated calls are grouped
        assert_eq!(callees(&oracle, &get).await, vec!["UserController.audit", "UserServiceImpl.find"]);

        let calls = oracle.outgoing_calls(&get).await.unwrap();
        assert_eq!(calls[1].call_sites.len(), 2);
    }

    #[tokio::test]
    async fn test_static_and_this_qualified_calls() {
        let oracle = oracle();
        let audit = oracle.prepare(Path::new("UserController.java"), Position::new(15, 17)).await.unwrap().remove(0);
        assert_eq!(callees(&oracle, &audit).await, vec!["Log.write"]);

        let find = oracle.prepare(Path::new("UserService.java"), Position::new(4, 16)).await.unwrap().remove(0);
        assert_eq!(callees(&oracle, &find).await, vec!["UserRepository.load"]);
    }

    #[tokio::test]
    async fn test_mutual_recursion_is_reported_as_is() {
        let oracle = oracle();
        let load = oracle.prepare(Path::new("UserService.java"), Position::new(10, 9)).await.unwrap().remove(0);
        assert_eq!(load.name, "load");
        assert_eq!(callees(&oracle, &load).await, vec!["UserRepository.reload"]);
    }

    #[tokio::test]
    async fn test_unknown_identity_is_an_error() {
        let oracle = oracle();
        let ghost = CallIdentity::new("ghost", "Nowhere", SourceLocation::new("X.java", Position::new(0, 0)));
        assert!(oracle.outgoing_calls(&ghost).await.is_err());
    }

    #[tokio::test]
    async fn test_local_receivers_match_their_type_exactly() {
        let source = r#"
class OrderController {
    private OrderRepository orders;

    Order place(Order input) {
        Order order = new Order();
        order.save();
        orders.save(order);
        return order;
    }
}

class Order {
    void validate() {}
}

class OrderRepositoryImpl {
    void save(Order order) {}
}
"#;
        let mut oracle = StaticCallGraphOracle::new();
        oracle.index_source(Path::new("Orders.java"), source).unwrap();
        assert_eq!(oracle.len(), 3);

        let place = oracle.prepare(Path::new("Orders.java"), Position::new(4, 10)).await.unwrap().remove(0);
        let calls = oracle.outgoing_calls(&place).await.unwrap();

        // only the field call lands in the repository
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].callee.context, "OrderRepositoryImpl");
        assert_eq!(calls[0].call_sites.len(), 1);
        assert_eq!(calls[0].call_sites[0].start.line, 7);
    }

    #[tokio::test]
    async fn test_index_merges_files_from_provider() {
        use assert_fs::prelude::*;
        use std::time::Duration;
        use tokio_util::sync::CancellationToken;

        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("UserController.java").write_str(CONTROLLER).unwrap();
        dir.child("UserService.java").write_str(SERVICE).unwrap();
        dir.child("Broken.java").write_str("class {{{").unwrap();

        let provider = JavaSymbolProvider::new(dir.path(), 1024 * 1024);
        let guard = CallGuard::new(Duration::from_secs(5), CancellationToken::new());
        let indexed = StaticCallGraphOracle::index(&provider, "**/*.java", &guard).await.unwrap();
        assert_eq!(indexed.len(), oracle().len());

        let file = dir.path().join("UserController.java");
        let get = indexed.prepare(&file, Position::new(6, 16)).await.unwrap().remove(0);
        assert_eq!(callees(&indexed, &get).await, vec!["UserController.audit", "UserServiceImpl.find"]);
    }

    #[test]
    fn test_base_type_name() {
        assert_eq!(base_type_name("List<User>"), "List");
        assert_eq!(base_type_name("com.acme.UserService"), "UserService");
        assert_eq!(base_type_name("byte[]"), "byte");
        assert_eq!(receiver_of("this.repository"), Receiver::Named("repository".to_string()));
        assert_eq!(receiver_of("super"), Receiver::This);
        assert_eq!(receiver_of("repository()"), Receiver::Opaque);
    }
}
