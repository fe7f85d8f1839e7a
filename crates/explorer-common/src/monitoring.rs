/// Evaluates the expression and returns it together with the time it took.
#[macro_export]
macro_rules! measure_duration {
    ($e: expr) => {{
        let now = std::time::Instant::now();

        let result = $e;
        (result, now.elapsed())
    }};
}

/// Emits a metric as a structured debug event. Any subscriber layer that understands the
/// `monotonic_counter.`, `counter.` and `histogram.` field prefixes can export them.
#[macro_export]
macro_rules! metric {
    (counter [ $label: ident ] = $i: expr $(,$field: ident = $value: expr)*) => {
        $crate::tracing::debug!(monotonic_counter.$label = $i, $($field = $value),*)
    };
    (on error $e: expr => counter [ $label: ident ] = $i: expr $(,$field: ident = $value: expr)*) => {
        if let Err(ref e) = $e {
            $crate::tracing::debug!(counter.$label = $i, $($field = $value,)* error = e.to_string());
        }
    };
    (histogram [ $label: ident ] = $i: expr $(,$field: ident = $value: expr)*) => {
        $crate::tracing::debug!(histogram.$label = $i as f64, $($field = $value),*)
    };
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    #[test]
    fn measure_duration_returns_value_and_elapsed_time() {
        let (value, duration) = measure_duration!({
            std::thread::sleep(Duration::from_millis(2));
            42
        });

        assert_eq!(value, 42);
        assert!(duration >= Duration::from_millis(2));
    }

    #[test]
    fn metric_on_error_accepts_both_outcomes() {
        let ok: Result<u8, String> = Ok(1);
        let err: Result<u8, String> = Err("boom".to_string());

        metric!(on error ok => counter [ test_error ] = 1, method = "ok");
        metric!(on error err => counter [ test_error ] = 1, method = "err");
        metric!(counter [ test_request ] = 1, method = "ok");
        metric!(histogram [ test_duration_milliseconds ] = 12u128, method = "ok");
    }
}
