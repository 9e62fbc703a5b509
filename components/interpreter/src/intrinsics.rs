//! Built-in functions reachable through `CallIntrinsic`

use std::collections::{BTreeSet, HashMap};

use core_types::{Value, VmError};
use memory_manager::{Heap, HeapObject};
use tracing::debug;

/// A runtime-provided function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// Write the arguments, space separated, and a newline
    Print,
    /// Length of a string or sequence
    Len,
    /// Type name of a value, as a new string
    TypeOf,
    /// Force a collection; returns objects reclaimed
    Gc,
    /// Number of live heap objects
    LiveObjects,
    /// Fault unless the argument is truthy
    Assert,
}

impl Intrinsic {
    /// Every intrinsic
    pub const ALL: [Intrinsic; 6] = [
        Intrinsic::Print,
        Intrinsic::Len,
        Intrinsic::TypeOf,
        Intrinsic::Gc,
        Intrinsic::LiveObjects,
        Intrinsic::Assert,
    ];

    /// Name used in bytecode
    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::Print => "print",
            Intrinsic::Len => "len",
            Intrinsic::TypeOf => "type_of",
            Intrinsic::Gc => "gc",
            Intrinsic::LiveObjects => "live_objects",
            Intrinsic::Assert => "assert",
        }
    }

    /// Required argument count, or `None` if variadic
    pub fn arity(self) -> Option<u8> {
        match self {
            Intrinsic::Print => None,
            Intrinsic::Len | Intrinsic::TypeOf | Intrinsic::Assert => Some(1),
            Intrinsic::Gc | Intrinsic::LiveObjects => Some(0),
        }
    }
}

/// Outcome of looking an intrinsic up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Available
    Found(Intrinsic),
    /// Exists but disabled by policy
    Denied,
    /// No such intrinsic
    Unknown,
}

/// Name → intrinsic table with a deny list
#[derive(Debug, Clone)]
pub struct IntrinsicTable {
    by_name: HashMap<&'static str, Intrinsic>,
    denied: BTreeSet<String>,
}

impl Default for IntrinsicTable {
    fn default() -> Self {
        Self::new()
    }
}

impl IntrinsicTable {
    /// Table with every intrinsic enabled
    pub fn new() -> Self {
        Self {
            by_name: Intrinsic::ALL.iter().map(|i| (i.name(), *i)).collect(),
            denied: BTreeSet::new(),
        }
    }

    /// Table with the named intrinsics disabled
    pub fn with_denied<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for name in names {
            table.deny(name);
        }
        table
    }

    /// Disable an intrinsic
    pub fn deny(&mut self, name: impl Into<String>) {
        let name = name.into();
        debug!(intrinsic = %name, "intrinsic denied");
        self.denied.insert(name);
    }

    /// Resolve a name
    pub fn lookup(&self, name: &str) -> Lookup {
        match self.by_name.get(name) {
            Some(_) if self.denied.contains(name) => Lookup::Denied,
            Some(intrinsic) => Lookup::Found(*intrinsic),
            None => Lookup::Unknown,
        }
    }

    /// Names currently denied
    pub fn denied(&self) -> impl Iterator<Item = &str> {
        self.denied.iter().map(String::as_str)
    }
}

/// Nesting beyond this prints as `...`, which also stops cycles
const MAX_RENDER_DEPTH: usize = 8;

/// Render a value the way `print` shows it
pub fn render_value(heap: &Heap, value: Value) -> String {
    let mut out = String::new();
    render_into(heap, value, 0, &mut out);
    out
}

fn render_into(heap: &Heap, value: Value, depth: usize, out: &mut String) {
    let object = match value {
        Value::Ref(object) => object,
        other => {
            out.push_str(&other.to_string());
            return;
        }
    };
    if depth >= MAX_RENDER_DEPTH {
        out.push_str("...");
        return;
    }

    let (open, close, items) = match heap.get(object) {
        None => {
            out.push_str(&format!("<dangling {}>", object));
            return;
        }
        Some(HeapObject::String(s)) => {
            // Quoted when nested
            if depth == 0 {
                out.push_str(s);
            } else {
                out.push_str(&format!("{:?}", s));
            }
            return;
        }
        Some(HeapObject::Boxed(inner)) => {
            out.push_str("box(");
            render_into(heap, *inner, depth + 1, out);
            out.push(')');
            return;
        }
        Some(HeapObject::Code(code)) => {
            let name = heap.get(code.name).and_then(HeapObject::as_str).unwrap_or("?");
            out.push_str(&format!("<code {}/{}>", name, code.arity));
            return;
        }
        Some(HeapObject::Tuple(items)) => ("(", ")", items),
        Some(HeapObject::Record(items)) => ("{", "}", items),
        Some(HeapObject::Array(items)) => ("[", "]", items),
    };

    out.push_str(open);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        render_into(heap, *item, depth + 1, out);
    }
    out.push_str(close);
}

/// Type name of a value, looking through references
pub fn type_name(heap: &Heap, value: Value) -> Result<&'static str, VmError> {
    match value {
        Value::Ref(object) => Ok(heap.resolve(object)?.type_name()),
        other => Ok(other.type_name()),
    }
}
