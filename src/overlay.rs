//! Owned map overlay objects.
//!
//! Markers and route lines belong to the host's map library. [`Overlay`]
//! keeps the handles it created and disposes of them when replaced, on
//! [`Overlay::clear`], and when dropped with its workflow.

use std::fmt::Debug;

use crate::geo::{BoundingBox, GeoPoint};
use crate::route::RouteEstimate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Store,
    Customer,
}

/// Host map surface.
pub trait MapCanvas {
    type Handle: Copy + Eq + Debug;

    fn add_marker(&mut self, kind: MarkerKind, point: GeoPoint) -> Self::Handle;
    fn add_polyline(&mut self, points: &[GeoPoint]) -> Self::Handle;
    fn fit_bounds(&mut self, bounds: BoundingBox);
    fn dispose(&mut self, handle: Self::Handle);
}

pub struct Overlay<C: MapCanvas> {
    canvas: C,
    store_marker: Option<C::Handle>,
    customer_marker: Option<C::Handle>,
    route_line: Option<C::Handle>,
}

impl<C: MapCanvas> Overlay<C> {
    pub fn new(canvas: C) -> Self {
        Self {
            canvas,
            store_marker: None,
            customer_marker: None,
            route_line: None,
        }
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn show_store(&mut self, point: GeoPoint) {
        let handle = self.canvas.add_marker(MarkerKind::Store, point);
        if let Some(old) = self.store_marker.replace(handle) {
            self.canvas.dispose(old);
        }
    }

    pub fn show_customer(&mut self, point: GeoPoint) {
        let handle = self.canvas.add_marker(MarkerKind::Customer, point);
        if let Some(old) = self.customer_marker.replace(handle) {
            self.canvas.dispose(old);
        }
    }

    /// Replaces the route line. Straight-line estimates only remove the old
    /// line; nothing is drawn for them.
    pub fn show_route(&mut self, route: &RouteEstimate) {
        if let Some(old) = self.route_line.take() {
            self.canvas.dispose(old);
        }
        if let RouteEstimate::Drawn(resolved) = route {
            self.route_line = Some(self.canvas.add_polyline(&resolved.points));
            if let Some(bounds) = resolved.bounds() {
                self.canvas.fit_bounds(bounds);
            }
        }
    }

    /// Disposes every object this overlay created.
    pub fn clear(&mut self) {
        for handle in [
            self.route_line.take(),
            self.customer_marker.take(),
            self.store_marker.take(),
        ]
        .into_iter()
        .flatten()
        {
            self.canvas.dispose(handle);
        }
    }
}

impl<C: MapCanvas> Drop for Overlay<C> {
    fn drop(&mut self) {
        self.clear();
    }
}
