//! Caller-facing wrappers for the metrics controller.
//!
//! Each method is a direct pass-through to the remote function of the same
//! name; none of them interprets the metric. Results are `None` when the
//! controller reports no value.

use std::fmt;

use serde::{Deserialize, Serialize};
use trustfacts_runtime::{Json, RegistryRuntime, Value};

use crate::registry::{FunctionTable, RemoteFn, TypedCall};
use crate::{Dispatcher, Result, StateError};

/// Project a data request is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
	pub project_platform: String,
	pub project_owner: String,
	pub project_name: String,
	pub project_release: String,
}

/// Document accepted by `get_data`: the project plus the data points wanted
/// from each source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRequest {
	pub project_info: ProjectInfo,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gh_data_points: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lib_data_points: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cve_data_points: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub so_data_points: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub virus_scanning: Option<Vec<String>>,
}

impl DataRequest {
	pub fn new(project_info: ProjectInfo) -> Self {
		Self {
			project_info,
			gh_data_points: None,
			lib_data_points: None,
			cve_data_points: None,
			so_data_points: None,
			virus_scanning: None,
		}
	}
}

/// API tokens as stored by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tokens {
	pub github_token: Option<String>,
	pub libraries_token: Option<String>,
}

macro_rules! remote_fns {
	($($konst:ident => $method:ident($($arg:ident: $ty:ty),*) -> $out:ty;)*) => {
		/// Descriptors of every remote function the controller exposes.
		pub mod functions {
			use super::*;

			$(pub const $konst: RemoteFn<($($ty,)*), $out> = RemoteFn::new(stringify!($method));)*
		}

		impl<R: RegistryRuntime + ?Sized> MetricsClient<R> {
			$(
			pub fn $method(&self, $($arg: impl Into<$ty>),*) -> TypedCall<$out> {
				self.dispatcher.call(&functions::$konst, ($($arg.into(),)*))
			}
			)*
		}

		/// Table of every function the wrappers call.
		pub fn function_table() -> FunctionTable {
			let mut table = FunctionTable::new();
			$(
			let registered = table.register(&functions::$konst);
			debug_assert!(registered.is_ok(), "wrapper table is static: {registered:?}");
			)*
			table
		}
	};
}

remote_fns! {
	GET_CONTRIBUTOR_COUNT => get_contributor_count(owner: String, repo: String) -> Option<i64>;
	GET_REPOSITORY_USER_COUNT => get_repository_user_count(owner: String, repo: String) -> Option<i64>;
	GET_TOTAL_DOWNLOAD_COUNT => get_total_download_count(owner: String, repo: String) -> Option<i64>;
	GET_RELEASE_DOWNLOAD_COUNT => get_release_download_count(owner: String, repo: String, release: String) -> Option<i64>;
	GET_YEARLY_COMMIT_COUNT => get_yearly_commit_count(owner: String, repo: String) -> Option<i64>;
	GET_COMMIT_COUNT_IN_YEAR => get_commit_count_in_year(owner: String, repo: String, year: i64) -> Option<i64>;
	GET_REPOSITORY_LANGUAGE => get_repository_language(owner: String, repo: String) -> Option<String>;
	GET_GITSTAR_RANKING => get_gitstar_ranking(owner: String, repo: String) -> Option<i64>;
	GET_OPEN_ISSUE_COUNT => get_open_issue_count(owner: String, repo: String) -> Option<i64>;
	GET_ZERO_RESPONSES_ISSUE_COUNT => get_zero_responses_issue_count(owner: String, repo: String) -> Option<i64>;
	GET_RELEASE_ISSUE_COUNT => get_release_issue_count(owner: String, repo: String, release: String) -> Option<i64>;
	GET_REPOSITORY_ISSUE_RATIO => get_repository_issue_ratio(owner: String, repo: String) -> Option<f64>;
	GET_AVERAGE_ISSUE_RESOLUTION_TIME => get_average_issue_resolution_time(owner: String, repo: String) -> Option<f64>;
	GET_OWNER_STARGAZER_COUNT => get_owner_stargazer_count(owner: String) -> Option<i64>;

	LIB_GET_RELEASE_FREQUENCY => lib_get_release_frequency(platform: String, name: String) -> Option<f64>;
	LIB_GET_CONTRIBUTORS_COUNT => lib_get_contributors_count(platform: String, name: String) -> Option<i64>;
	LIB_GET_DEPENDENCY_COUNT => lib_get_dependency_count(platform: String, name: String, release: String) -> Option<i64>;
	LIB_GET_DEPENDENT_COUNT => lib_get_dependent_count(platform: String, name: String) -> Option<i64>;
	LIB_GET_LATEST_RELEASE_DATE => lib_get_latest_release_date(platform: String, name: String) -> Option<String>;
	LIB_GET_FIRST_RELEASE_DATE => lib_get_first_release_date(platform: String, name: String) -> Option<String>;
	LIB_GET_RELEASE_COUNT => lib_get_release_count(platform: String, name: String) -> Option<i64>;
	LIB_GET_SOURCERANK => lib_get_sourcerank(platform: String, name: String) -> Option<i64>;

	GET_DATA => get_data(request: Json<DataRequest>) -> Value;
	UPDATE_TOKENS => update_tokens(github_token: String, libraries_token: String) -> ();
	UPDATE_TOKEN_GH => update_token_gh(github_token: String) -> ();
	UPDATE_TOKEN_LIB => update_token_lib(libraries_token: String) -> ();
	GET_TOKENS => get_tokens() -> Json<Tokens>;
}

/// Typed client over a [`Dispatcher`] with the metrics controller loaded.
pub struct MetricsClient<R: RegistryRuntime + ?Sized = dyn RegistryRuntime> {
	dispatcher: Dispatcher<R>,
}

impl<R: RegistryRuntime + ?Sized> fmt::Debug for MetricsClient<R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MetricsClient").field("dispatcher", &self.dispatcher).finish()
	}
}

impl<R: RegistryRuntime + ?Sized> Clone for MetricsClient<R> {
	fn clone(&self) -> Self {
		Self {
			dispatcher: self.dispatcher.clone(),
		}
	}
}

impl<R: RegistryRuntime + ?Sized> MetricsClient<R> {
	pub fn new(dispatcher: Dispatcher<R>) -> Self {
		Self { dispatcher }
	}

	pub fn dispatcher(&self) -> &Dispatcher<R> {
		&self.dispatcher
	}

	/// Checks the loaded module against every wrapper.
	///
	/// # Errors
	///
	/// A state error before a module is loaded, or
	/// [`DispatchError::Signature`](crate::DispatchError::Signature) naming each missing or mismatched export.
	pub fn validate(&self) -> Result<()> {
		let module = self.dispatcher.module().ok_or(StateError::ModuleNotLoaded)?;
		function_table().validate_module(&module)
	}
}

impl From<DataRequest> for Json<DataRequest> {
	fn from(request: DataRequest) -> Self {
		Json(request)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn descriptors_use_the_remote_names() {
		assert_eq!(functions::LIB_GET_RELEASE_COUNT.name(), "lib_get_release_count");
		assert_eq!(functions::GET_OWNER_STARGAZER_COUNT.arity(), 1);
		assert_eq!(functions::GET_COMMIT_COUNT_IN_YEAR.arity(), 3);
		assert_eq!(functions::GET_DATA.name(), "get_data");
		assert_eq!(function_table().len(), 27);
	}

	#[test]
	fn data_request_matches_controller_document() {
		let mut request = DataRequest::new(ProjectInfo {
			project_platform: "NPM".into(),
			project_owner: "facebook".into(),
			project_name: "react".into(),
			project_release: "v18.1.0".into(),
		});
		request.gh_data_points = Some(vec!["gh_contributor_count".into()]);
		request.virus_scanning = Some(vec!["virus_ratio".into()]);

		assert_eq!(
			serde_json::to_value(&request).unwrap(),
			json!({
				"project_info": {
					"project_platform": "NPM",
					"project_owner": "facebook",
					"project_name": "react",
					"project_release": "v18.1.0",
				},
				"gh_data_points": ["gh_contributor_count"],
				"virus_scanning": ["virus_ratio"],
			})
		);
	}
}
