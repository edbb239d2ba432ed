//! Format layer creation macro

/// Applies the shared display options to a fmt layer and boxes it.
///
/// Disabling timestamps changes the layer's type, so both branches are
/// boxed here to give every format the same layer type.
macro_rules! boxed_fmt_layer {
    ($layer:expr, $display:expr) => {{
        let layer = $layer
            .with_ansi($display.colors)
            .with_target($display.target)
            .with_file($display.source)
            .with_line_number($display.source)
            .with_thread_ids($display.thread_ids)
            .with_thread_names($display.thread_names);

        if $display.time {
            tracing_subscriber::Layer::boxed(layer)
        } else {
            tracing_subscriber::Layer::boxed(layer.without_time())
        }
    }};
}
