//! Typed descriptors for remote functions.
//!
//! A [`RemoteFn`] pins a function name to its argument tuple and result type,
//! so wrappers like [`MetricsClient`](crate::MetricsClient) are checked at
//! compile time. A [`FunctionTable`] collects descriptors and checks them
//! against the exports a runtime reports for the loaded module.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use trustfacts_runtime::{FromValue, IntoValue, MarshalError, ModuleInfo, RuntimeError, Value};

use crate::call::{CallId, PendingCall};
use crate::{DispatchError, Result};

/// Positional argument lists: tuples of [`IntoValue`] up to arity 6.
pub trait Args {
	const ARITY: usize;

	fn into_values(self) -> Result<Vec<Value>, MarshalError>;
}

impl Args for () {
	const ARITY: usize = 0;

	fn into_values(self) -> Result<Vec<Value>, MarshalError> {
		Ok(Vec::new())
	}
}

macro_rules! impl_args {
	($arity:expr => $($name:ident),+) => {
		impl<$($name: IntoValue),+> Args for ($($name,)+) {
			const ARITY: usize = $arity;

			#[allow(non_snake_case, reason = "tuple fields are bound by their type parameter names")]
			fn into_values(self) -> Result<Vec<Value>, MarshalError> {
				let ($($name,)+) = self;
				Ok(vec![$($name.into_value()?),+])
			}
		}
	};
}

impl_args!(1 => A);
impl_args!(2 => A, B);
impl_args!(3 => A, B, C);
impl_args!(4 => A, B, C, D);
impl_args!(5 => A, B, C, D, E);
impl_args!(6 => A, B, C, D, E, F);

/// Name and signature of a function exported by the registry.
pub struct RemoteFn<A, O> {
	name: &'static str,
	_sig: PhantomData<fn(A) -> O>,
}

impl<A, O> RemoteFn<A, O> {
	pub const fn new(name: &'static str) -> Self {
		Self { name, _sig: PhantomData }
	}

	pub const fn name(&self) -> &'static str {
		self.name
	}
}

impl<A: Args, O> RemoteFn<A, O> {
	pub const fn arity(&self) -> usize {
		A::ARITY
	}
}

impl<A, O> Clone for RemoteFn<A, O> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<A, O> Copy for RemoteFn<A, O> {}

impl<A, O> fmt::Debug for RemoteFn<A, O> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("RemoteFn").field(&self.name).finish()
	}
}

/// Registered descriptors, by name.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
	arities: BTreeMap<&'static str, usize>,
}

fn valid_name(name: &str) -> bool {
	let mut chars = name.chars();
	chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl FunctionTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// # Errors
	///
	/// [`DispatchError::Signature`] for a malformed or duplicate name.
	pub fn register<A: Args, O>(&mut self, function: &RemoteFn<A, O>) -> Result<()> {
		let name = function.name();
		if !valid_name(name) {
			return Err(DispatchError::Signature(format!("invalid function name {name:?}")));
		}
		if self.arities.insert(name, A::ARITY).is_some() {
			return Err(DispatchError::Signature(format!("function '{name}' registered twice")));
		}
		Ok(())
	}

	pub fn contains(&self, name: &str) -> bool {
		self.arities.contains_key(name)
	}

	pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
		self.arities.keys().copied()
	}

	pub fn len(&self) -> usize {
		self.arities.len()
	}

	pub fn is_empty(&self) -> bool {
		self.arities.is_empty()
	}

	/// Checks every registered function against the module's exports.
	///
	/// Modules that do not report exports pass unchecked.
	///
	/// # Errors
	///
	/// [`DispatchError::Signature`] listing every missing export and arity
	/// mismatch.
	pub fn validate_module(&self, module: &ModuleInfo) -> Result<()> {
		let Some(exports) = &module.exports else {
			return Ok(());
		};
		let problems: Vec<String> = self
			.arities
			.iter()
			.filter_map(|(&name, &arity)| match exports.get(name) {
				None => Some(format!("'{name}' is not exported")),
				Some(exported) if !exported.accepts(arity) => Some(format!("'{name}' takes {exported} arguments, registered with {arity}")),
				Some(_) => None,
			})
			.collect();
		if problems.is_empty() {
			Ok(())
		} else {
			Err(DispatchError::Signature(format!("module '{}': {}", module.name, problems.join("; "))))
		}
	}
}

/// Future resolving to the decoded outcome of a typed call.
#[must_use = "dropping a TypedCall discards the result"]
pub struct TypedCall<O> {
	inner: PendingCall,
	_out: PhantomData<fn() -> O>,
}

impl<O> fmt::Debug for TypedCall<O> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("TypedCall").field(&self.inner).finish()
	}
}

impl<O> TypedCall<O> {
	pub(crate) fn new(inner: PendingCall) -> Self {
		Self { inner, _out: PhantomData }
	}

	pub fn id(&self) -> CallId {
		self.inner.id()
	}

	pub fn cancel(&self) {
		self.inner.cancel();
	}
}

impl<O: FromValue> Future for TypedCall<O> {
	type Output = Result<O>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.inner)
			.poll(cx)
			.map(|outcome| outcome.and_then(|value| O::from_value(value).map_err(|err| RuntimeError::from(err).into())))
	}
}
