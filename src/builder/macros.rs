//! Macros for ergonomic state value construction.

/// Build a [`StateValue`](crate::core::StateValue) from a JSON-like literal.
///
/// # Example
///
/// ```
/// use statecharts::core::StateValue;
/// use statecharts::state_value;
///
/// let leaf = state_value!("idle");
/// assert_eq!(leaf, StateValue::leaf("idle"));
///
/// let parallel = state_value!({
///     "audio": "muted",
///     "video": { "mode": "playing" },
/// });
/// assert!(parallel.contains("video.mode.playing"));
/// ```
#[macro_export]
macro_rules! state_value {
    ({ $($key:literal : $value:tt),* $(,)? }) => {{
        #[allow(unused_mut)]
        let mut regions = ::std::collections::BTreeMap::new();
        $(
            regions.insert(::std::string::String::from($key), $crate::state_value!($value));
        )*
        $crate::core::StateValue::Regions(regions)
    }};
    ($leaf:literal) => {
        $crate::core::StateValue::Leaf(::std::string::String::from($leaf))
    };
}
