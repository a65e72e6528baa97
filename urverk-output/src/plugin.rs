//! ## urverk-output::plugin
//! **Output plug-in contract**
//!
//! The thin write-interface the kernel invokes. Plug-ins receive their view
//! configuration once, a declaration per observed `(model, port)` pair, one
//! call per flushed value, and a terminal `finish` that may return an
//! aggregated matrix.

use urverk_core::time::Time;
use urverk_core::value::{Map, Matrix, Value};

pub trait OutputPlugin {
    /// Called once when the view is attached, with the view name and its
    /// scenario-supplied configuration.
    fn on_parameter(&mut self, view: &str, config: &Map);

    /// A `(model, port)` pair starts being observed on this view.
    fn on_new_observable(&mut self, model: &str, port: &str);

    /// One observed value. Values arrive grouped by bag, in deterministic
    /// view/record order.
    fn on_value(&mut self, model: &str, port: &str, t: Time, value: &Value);

    /// The pair stops being observed (model deleted mid-run).
    fn on_delete_observable(&mut self, model: &str, port: &str);

    /// Terminal call at `t_end`; may return an aggregated result.
    fn finish(&mut self, t_end: Time) -> Option<Matrix>;

    /// Opt-in to an explicit `flush` call when each bag closes.
    fn flush_by_bag(&self) -> bool {
        false
    }

    /// Bag-close hook, only invoked when [`OutputPlugin::flush_by_bag`] is
    /// true.
    fn flush(&mut self) {}
}
