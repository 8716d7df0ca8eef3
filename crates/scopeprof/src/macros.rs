//! Profiling macros.

/// Create a profiling scope that measures execution time until end of scope.
///
/// When the `profiling` feature is disabled, this macro expands to nothing.
///
/// # Examples
///
/// ```ignore
/// use scopeprof::profile_scope;
///
/// fn build_mesh() {
///     profile_scope!("Chunk::build_mesh");
///     // ... meshing code
/// } // timing recorded here
/// ```
///
/// Against an explicit profiler:
/// ```ignore
/// profile_scope!(profiler, "Chunk::build_mesh");
/// ```
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_scope {
    ($label:expr) => {
        let _scope_timer = $crate::ScopeTimer::new($label);
    };
    ($profiler:expr, $label:expr) => {
        let _scope_timer = $crate::ScopeTimer::for_profiler(&$profiler, $label);
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_scope {
    ($label:expr) => {};
    ($profiler:expr, $label:expr) => {};
}

/// Profile the enclosing function under its path, e.g. `my_crate::world::tick`.
///
/// When the `profiling` feature is disabled, this macro expands to nothing.
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_function {
    () => {
        let _scope_timer = $crate::ScopeTimer::new($crate::function_name!());
    };
    ($profiler:expr) => {
        let _scope_timer = $crate::ScopeTimer::for_profiler(&$profiler, $crate::function_name!());
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_function {
    () => {};
    ($profiler:expr) => {};
}

/// Path of the enclosing function.
#[doc(hidden)]
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        name.strip_suffix("::f").unwrap_or(name)
    }};
}
