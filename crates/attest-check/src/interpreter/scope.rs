//! Callables and the scope they resolve names in.
//!
//! A [`Callable`] is either a script function (IR interpreted inside a
//! [`Scope`]) or a native Rust closure with an explicit [`Signature`]. The
//! scope holds every function of the enclosing module, the native helpers and
//! the record declarations, so helper references inside a function resolve
//! the same way whether the function is the original or a mutant.

use std::fmt;
use std::sync::Arc;

use attest_core::ast::FunctionDecl;
use attest_core::types::{TypeDesc, TypeEnv};
use indexmap::IndexMap;

use super::error::RuntimeError;
use super::value::Value;
use super::{Interpreter, InterpreterConfig};

/// Keyword arguments of one call, in parameter order.
pub type Args = IndexMap<String, Value>;

/// A native function body.
pub type NativeFn = Arc<dyn Fn(&Args) -> Result<Value, RuntimeError> + Send + Sync>;

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSig {
    pub name: String,
    /// `None` for an unannotated parameter.
    pub ty: Option<TypeDesc>,
    pub default: Option<Value>,
}

impl ParamSig {
    pub fn new(name: impl Into<String>, ty: TypeDesc) -> Self {
        ParamSig {
            name: name.into(),
            ty: Some(ty),
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<ParamSig>,
    pub returns: Option<TypeDesc>,
}

impl Signature {
    pub fn new(name: impl Into<String>, params: Vec<ParamSig>, returns: Option<TypeDesc>) -> Self {
        Signature {
            name: name.into(),
            params,
            returns,
        }
    }
}

/// Name-resolution environment for script functions.
#[derive(Clone, Default)]
pub struct Scope {
    functions: IndexMap<String, Arc<FunctionDecl>>,
    natives: IndexMap<String, (Signature, NativeFn)>,
    types: TypeEnv,
}

impl Scope {
    pub fn new(types: TypeEnv) -> Self {
        Scope {
            types,
            ..Scope::default()
        }
    }

    pub fn add_function(&mut self, decl: Arc<FunctionDecl>) {
        self.functions.insert(decl.name.clone(), decl);
    }

    pub fn add_native(&mut self, signature: Signature, func: NativeFn) {
        self.natives.insert(signature.name.clone(), (signature, func));
    }

    /// Returns a copy of this scope in which `decl` replaces the function of
    /// the same name. Recursive calls inside `decl` then reach `decl` itself.
    pub fn with_function(&self, decl: Arc<FunctionDecl>) -> Scope {
        let mut scope = self.clone();
        scope.add_function(decl);
        scope
    }

    pub fn function(&self, name: &str) -> Option<&Arc<FunctionDecl>> {
        self.functions.get(name)
    }

    pub fn native(&self, name: &str) -> Option<&(Signature, NativeFn)> {
        self.natives.get(name)
    }

    pub fn types(&self) -> &TypeEnv {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeEnv {
        &mut self.types
    }

    /// True if `name` resolves to something callable in this scope.
    pub fn resolves(&self, name: &str) -> bool {
        self.functions.contains_key(name)
            || self.natives.contains_key(name)
            || self.types.record(name).is_some()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("natives", &self.natives.keys().collect::<Vec<_>>())
            .field("types", &self.types)
            .finish()
    }
}

/// A function that can be verified, used as a specification, or called as a
/// helper.
#[derive(Clone)]
pub enum Callable {
    Script {
        decl: Arc<FunctionDecl>,
        scope: Arc<Scope>,
    },
    Native {
        signature: Signature,
        func: NativeFn,
    },
}

impl Callable {
    pub fn native(
        signature: Signature,
        func: impl Fn(&Args) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        Callable::Native {
            signature,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Callable::Script { decl, .. } => &decl.name,
            Callable::Native { signature, .. } => &signature.name,
        }
    }

    /// The syntax tree, for script functions.
    pub fn decl(&self) -> Option<&Arc<FunctionDecl>> {
        match self {
            Callable::Script { decl, .. } => Some(decl),
            Callable::Native { .. } => None,
        }
    }

    /// The scope a script function resolves names in.
    pub fn scope(&self) -> Option<&Arc<Scope>> {
        match self {
            Callable::Script { scope, .. } => Some(scope),
            Callable::Native { .. } => None,
        }
    }

    /// Parameter list with declared types and evaluated defaults.
    ///
    /// A script default that fails to evaluate is dropped; the parameter is
    /// then treated as required.
    pub fn signature(&self) -> Signature {
        match self {
            Callable::Native { signature, .. } => signature.clone(),
            Callable::Script { decl, scope } => {
                let mut interp = Interpreter::new(InterpreterConfig::default());
                let params = decl
                    .params
                    .iter()
                    .map(|p| ParamSig {
                        name: p.name.clone(),
                        ty: p.ty.clone(),
                        default: p
                            .default
                            .as_ref()
                            .and_then(|e| interp.eval_const(e, scope).ok()),
                    })
                    .collect();
                Signature {
                    name: decl.name.clone(),
                    params,
                    returns: decl.returns.clone(),
                }
            }
        }
    }

    /// Calls with a fresh interpreter using the default limits.
    pub fn call(&self, args: &Args) -> Result<Value, RuntimeError> {
        let mut interp = Interpreter::new(InterpreterConfig::default());
        self.call_with(args, &mut interp)
    }

    /// Calls with a caller-supplied interpreter (limits, RNG, output log).
    pub fn call_with(&self, args: &Args, interp: &mut Interpreter) -> Result<Value, RuntimeError> {
        match self {
            Callable::Native { func, .. } => func(args),
            Callable::Script { decl, scope } => interp.call_keyword(decl, scope, args),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Script { decl, .. } => write!(f, "Callable::Script({})", decl.name),
            Callable::Native { signature, .. } => write!(f, "Callable::Native({})", signature.name),
        }
    }
}
