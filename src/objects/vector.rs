//! Vector graphics contexts.
//!
//! A [`VectorContext`] exposes a small cairo style drawing API: build a path
//! with `move_to` / `line_to` / `curve_to` / `arc` / `rectangle`, pick a
//! [`Pattern`] as source, then `fill` or `stroke`. The actual drawing is done
//! by a [`VectorBackend`] chosen by name when the context is created (see
//! [`Context::create_vector_context`](crate::context::Context::create_vector_context)).
//!
//! # Built-in backends
//!
//! - `"cairo"` maps to [`RecordingBackend`], a software display list that a
//!   library rasterizer can replay
//! - `"opengl"` and `"opengl-fixed"` map to [`TessellatingBackend`], which
//!   flattens paths into triangle and line geometry kept in
//!   [`AttributeSet`]s on the display device. The fixed variant drops the
//!   per-vertex colour channel and reports colours per batch instead.
//!
//! Rasterization itself is left to whoever consumes the backend output.

use std::{
    any::Any,
    cell::{Cell, RefCell},
    f32::consts::{FRAC_PI_2, TAU},
    rc::Rc,
};

use cgmath::{EuclideanSpace, InnerSpace, Point2, Vector2};

use crate::{
    data_structures::{
        attribute::AttributeRole,
        attribute_set::{AttributeHandle, AttributeSet, DrawMode},
        scene_graph::SceneNodeParams,
    },
    device::{DeviceTexture, DisplayDevice, DisplayDeviceDefinition, TextureDescription, TextureFormat},
    error::RenderError,
    objects::{Attachment, Renderable},
    render::OVERLAY_QUEUE,
};

pub type Rgba = [f32; 4];

/// Segments used for every flattened curve.
const CURVE_SEGMENTS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorStop {
    pub offset: f32,
    pub colour: Rgba,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pattern {
    Solid(Rgba),
    LinearGradient {
        start: Point2<f32>,
        end: Point2<f32>,
        stops: Vec<ColorStop>,
    },
    RadialGradient {
        center: Point2<f32>,
        radius: f32,
        stops: Vec<ColorStop>,
    },
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern::Solid([0.0, 0.0, 0.0, 1.0])
    }
}

impl Pattern {
    pub fn solid(r: f32, g: f32, b: f32, a: f32) -> Self {
        Pattern::Solid([r, g, b, a])
    }

    pub fn linear(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Pattern::LinearGradient {
            start: Point2::new(x0, y0),
            end: Point2::new(x1, y1),
            stops: Vec::new(),
        }
    }

    pub fn radial(cx: f32, cy: f32, radius: f32) -> Self {
        Pattern::RadialGradient {
            center: Point2::new(cx, cy),
            radius,
            stops: Vec::new(),
        }
    }

    /// Add a stop at `offset` (clamped to 0..=1). Solid patterns ignore stops.
    pub fn add_color_stop(mut self, offset: f32, colour: Rgba) -> Self {
        if let Pattern::LinearGradient { stops, .. } | Pattern::RadialGradient { stops, .. } =
            &mut self
        {
            let offset = offset.clamp(0.0, 1.0);
            // stops with equal offsets keep insertion order
            let at = stops.partition_point(|s| s.offset <= offset);
            stops.insert(at, ColorStop { offset, colour });
        }
        self
    }

    /// Colour of the pattern at `point`.
    pub fn sample(&self, point: Point2<f32>) -> Rgba {
        match self {
            Pattern::Solid(colour) => *colour,
            Pattern::LinearGradient { start, end, stops } => {
                let axis = end - start;
                let length = axis.magnitude2();
                let t = if length == 0.0 {
                    0.0
                } else {
                    (point - start).dot(axis) / length
                };
                interpolate(stops, t)
            }
            Pattern::RadialGradient {
                center,
                radius,
                stops,
            } => {
                let t = if *radius <= 0.0 {
                    1.0
                } else {
                    (point - center).magnitude() / radius
                };
                interpolate(stops, t)
            }
        }
    }
}

fn interpolate(stops: &[ColorStop], t: f32) -> Rgba {
    let t = t.clamp(0.0, 1.0);
    let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
        return [0.0; 4];
    };
    if t <= first.offset {
        return first.colour;
    }
    if t >= last.offset {
        return last.colour;
    }
    let upper = stops.partition_point(|s| s.offset <= t);
    let (a, b) = (stops[upper - 1], stops[upper]);
    let span = b.offset - a.offset;
    let f = if span == 0.0 { 0.0 } else { (t - a.offset) / span };
    std::array::from_fn(|i| a.colour[i] + (b.colour[i] - a.colour[i]) * f)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathCommand {
    MoveTo(Point2<f32>),
    LineTo(Point2<f32>),
    CurveTo(Point2<f32>, Point2<f32>, Point2<f32>),
    ClosePath,
}

/// A polyline produced by [`Path::flatten`].
#[derive(Clone, Debug, PartialEq)]
pub struct Subpath {
    pub points: Vec<Point2<f32>>,
    pub closed: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path {
    commands: Vec<PathCommand>,
    current: Option<Point2<f32>>,
    subpath_start: Option<Point2<f32>>,
}

impl Path {
    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn current_point(&self) -> Option<Point2<f32>> {
        self.current
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        let p = Point2::new(x, y);
        self.commands.push(PathCommand::MoveTo(p));
        self.current = Some(p);
        self.subpath_start = Some(p);
    }

    /// Without a current point this behaves like `move_to`.
    pub fn line_to(&mut self, x: f32, y: f32) {
        if self.current.is_none() {
            return self.move_to(x, y);
        }
        let p = Point2::new(x, y);
        self.commands.push(PathCommand::LineTo(p));
        self.current = Some(p);
    }

    pub fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x3: f32, y3: f32) {
        if self.current.is_none() {
            self.move_to(x1, y1);
        }
        let end = Point2::new(x3, y3);
        self.commands.push(PathCommand::CurveTo(
            Point2::new(x1, y1),
            Point2::new(x2, y2),
            end,
        ));
        self.current = Some(end);
    }

    /// Circular arc from `angle1` to `angle2` (radians, increasing), built
    /// from cubic segments of at most a quarter turn. A line joins the current
    /// point to the start of the arc.
    pub fn arc(&mut self, xc: f32, yc: f32, radius: f32, angle1: f32, mut angle2: f32) {
        while angle2 < angle1 {
            angle2 += TAU;
        }
        let at = |angle: f32| Point2::new(xc + radius * angle.cos(), yc + radius * angle.sin());
        let start = at(angle1);
        if self.current.is_some() {
            self.line_to(start.x, start.y);
        } else {
            self.move_to(start.x, start.y);
        }
        let segments = ((angle2 - angle1) / FRAC_PI_2).ceil().max(1.0) as usize;
        let step = (angle2 - angle1) / segments as f32;
        let k = 4.0 / 3.0 * (step / 4.0).tan() * radius;
        for i in 0..segments {
            let a0 = angle1 + step * i as f32;
            let a1 = a0 + step;
            let p0 = at(a0);
            let p3 = at(a1);
            let c1 = p0 + Vector2::new(-a0.sin(), a0.cos()) * k;
            let c2 = p3 + Vector2::new(a1.sin(), -a1.cos()) * k;
            self.curve_to(c1.x, c1.y, c2.x, c2.y, p3.x, p3.y);
        }
    }

    pub fn rectangle(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.move_to(x, y);
        self.line_to(x + width, y);
        self.line_to(x + width, y + height);
        self.line_to(x, y + height);
        self.close_path();
    }

    pub fn close_path(&mut self) {
        if self.current.is_none() {
            return;
        }
        self.commands.push(PathCommand::ClosePath);
        self.current = self.subpath_start;
    }

    /// Turn the path into polylines, curves become [`CURVE_SEGMENTS`] lines.
    pub fn flatten(&self) -> Vec<Subpath> {
        let mut subpaths = Vec::new();
        let mut points: Vec<Point2<f32>> = Vec::new();
        let mut flush = |points: &mut Vec<Point2<f32>>, closed: bool| {
            if points.len() > 1 {
                subpaths.push(Subpath {
                    points: std::mem::take(points),
                    closed,
                });
            } else {
                points.clear();
            }
        };
        for command in &self.commands {
            match *command {
                PathCommand::MoveTo(p) => {
                    flush(&mut points, false);
                    points.push(p);
                }
                PathCommand::LineTo(p) => points.push(p),
                PathCommand::CurveTo(c1, c2, end) => {
                    let Some(&start) = points.last() else {
                        continue;
                    };
                    points.extend((1..=CURVE_SEGMENTS).map(|i| {
                        cubic(start, c1, c2, end, i as f32 / CURVE_SEGMENTS as f32)
                    }));
                }
                PathCommand::ClosePath => {
                    let start = points.first().copied();
                    flush(&mut points, true);
                    // drawing continues from the start of the closed subpath
                    points.extend(start);
                }
            }
        }
        flush(&mut points, false);
        subpaths
    }
}

fn cubic(p0: Point2<f32>, p1: Point2<f32>, p2: Point2<f32>, p3: Point2<f32>, t: f32) -> Point2<f32> {
    let u = 1.0 - t;
    Point2::from_vec(
        p0.to_vec() * (u * u * u)
            + p1.to_vec() * (3.0 * u * u * t)
            + p2.to_vec() * (3.0 * u * t * t)
            + p3.to_vec() * (t * t * t),
    )
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphicsState {
    pub source: Pattern,
    pub line_width: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            source: Pattern::default(),
            line_width: 2.0,
        }
    }
}

/// The part of a vector context that talks to a concrete library or GPU.
pub trait VectorBackend {
    fn name(&self) -> &str;

    fn attach(&mut self, device: &Rc<dyn DisplayDevice>) -> Result<DisplayDeviceDefinition, RenderError>;

    fn clear(&mut self, colour: Rgba) -> Result<(), RenderError>;

    fn fill(&mut self, path: &Path, source: &Pattern) -> Result<(), RenderError>;

    fn stroke(&mut self, path: &Path, source: &Pattern, line_width: f32) -> Result<(), RenderError>;

    /// End of frame: hand everything drawn so far to the device.
    fn flush(&mut self) -> Result<(), RenderError>;

    fn as_any(&self) -> &dyn Any;
}

#[derive(Clone, Debug, PartialEq)]
pub enum DisplayCommand {
    Clear(Rgba),
    Fill { path: Path, source: Pattern },
    Stroke { path: Path, source: Pattern, line_width: f32 },
}

/// Software backend: records a display list per frame.
pub struct RecordingBackend {
    width: u32,
    height: u32,
    surface: Option<DeviceTexture>,
    commands: Vec<DisplayCommand>,
    presented: Vec<DisplayCommand>,
    frames: usize,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            surface: None,
            commands: Vec::new(),
            presented: Vec::new(),
            frames: 0,
        }
    }

    /// Commands drawn since the last flush.
    pub fn commands(&self) -> &[DisplayCommand] {
        &self.commands
    }

    /// Commands of the last flushed frame.
    pub fn presented(&self) -> &[DisplayCommand] {
        &self.presented
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl VectorBackend for RecordingBackend {
    fn name(&self) -> &str {
        "cairo"
    }

    fn attach(&mut self, device: &Rc<dyn DisplayDevice>) -> Result<DisplayDeviceDefinition, RenderError> {
        let surface = DeviceTexture::new(
            device,
            &TextureDescription {
                label: "vector surface".to_string(),
                width: self.width,
                height: self.height,
                format: TextureFormat::Rgba8,
            },
        )?;
        let definition = DisplayDeviceDefinition::new(device.id()).with_texture(surface.handle());
        self.surface = Some(surface);
        Ok(definition)
    }

    fn clear(&mut self, colour: Rgba) -> Result<(), RenderError> {
        self.commands.clear();
        self.commands.push(DisplayCommand::Clear(colour));
        Ok(())
    }

    fn fill(&mut self, path: &Path, source: &Pattern) -> Result<(), RenderError> {
        self.commands.push(DisplayCommand::Fill {
            path: path.clone(),
            source: source.clone(),
        });
        Ok(())
    }

    fn stroke(&mut self, path: &Path, source: &Pattern, line_width: f32) -> Result<(), RenderError> {
        self.commands.push(DisplayCommand::Stroke {
            path: path.clone(),
            source: source.clone(),
            line_width,
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RenderError> {
        self.presented = std::mem::take(&mut self.commands);
        self.frames += 1;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A run of geometry drawn with one source.
///
/// `colour` is the source sampled at the centroid of the batch's vertices,
/// which is what a renderer without per-vertex colour draws with.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub first: usize,
    pub count: usize,
    pub colour: Rgba,
    /// Set for stroke batches only.
    pub line_width: Option<f32>,
}

/// Mean of the `x, y` pairs in `positions`.
fn centroid(positions: &[f32]) -> Point2<f32> {
    let points = positions.len() / 2;
    if points == 0 {
        return Point2::new(0.0, 0.0);
    }
    let (x, y) = positions
        .chunks_exact(2)
        .fold((0.0, 0.0), |(x, y), p| (x + p[0], y + p[1]));
    Point2::new(x / points as f32, y / points as f32)
}

#[derive(Default)]
struct Staging {
    fill_positions: Vec<f32>,
    fill_colours: Vec<f32>,
    fill_indices: Vec<u32>,
    stroke_positions: Vec<f32>,
    stroke_colours: Vec<f32>,
    fill_batches: Vec<Batch>,
    stroke_batches: Vec<Batch>,
}

struct Geometry {
    set: AttributeSet,
    positions: AttributeHandle<f32>,
    colours: Option<AttributeHandle<f32>>,
}

impl Geometry {
    fn new(mode: DrawMode, indexed: bool, per_vertex_colour: bool) -> Result<Self, RenderError> {
        let mut set = AttributeSet::new(mode, true, indexed, false);
        let positions =
            set.add_attribute_description::<f32>(AttributeRole::Position, 2, false, 0, 0, 0)?;
        let colours = per_vertex_colour
            .then(|| set.add_attribute_description::<f32>(AttributeRole::Color, 4, false, 0, 0, 0))
            .transpose()?;
        Ok(Self {
            set,
            positions,
            colours,
        })
    }
}

/// GPU backend: flattens paths into geometry that lives on the device.
///
/// Fills are fan-triangulated per subpath, which is exact for convex shapes
/// only. Strokes become line lists; the line width is kept on each stroke
/// batch for the consumer to honour.
pub struct TessellatingBackend {
    name: &'static str,
    fills: Geometry,
    strokes: Geometry,
    staging: Staging,
    fill_batches: Vec<Batch>,
    stroke_batches: Vec<Batch>,
    clear_colour: Option<Rgba>,
}

impl TessellatingBackend {
    pub fn new(fixed_function: bool) -> Result<Self, RenderError> {
        Ok(Self {
            name: if fixed_function { "opengl-fixed" } else { "opengl" },
            fills: Geometry::new(DrawMode::Triangles, true, !fixed_function)?,
            strokes: Geometry::new(DrawMode::Lines, false, !fixed_function)?,
            staging: Staging::default(),
            fill_batches: Vec::new(),
            stroke_batches: Vec::new(),
            clear_colour: None,
        })
    }

    pub fn fill_geometry(&self) -> &AttributeSet {
        &self.fills.set
    }

    pub fn stroke_geometry(&self) -> &AttributeSet {
        &self.strokes.set
    }

    /// Batches of the last flushed frame, counted in indices.
    pub fn fill_batches(&self) -> &[Batch] {
        &self.fill_batches
    }

    /// Batches of the last flushed frame, counted in vertices.
    pub fn stroke_batches(&self) -> &[Batch] {
        &self.stroke_batches
    }

    pub fn clear_colour(&self) -> Option<Rgba> {
        self.clear_colour
    }

    fn push_vertex(positions: &mut Vec<f32>, colours: &mut Vec<f32>, p: Point2<f32>, source: &Pattern) {
        positions.extend([p.x, p.y]);
        colours.extend(source.sample(p));
    }
}

impl VectorBackend for TessellatingBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn attach(&mut self, device: &Rc<dyn DisplayDevice>) -> Result<DisplayDeviceDefinition, RenderError> {
        let fills = self.fills.set.bind(device)?;
        let strokes = self.strokes.set.bind(device)?;
        Ok(DisplayDeviceDefinition::new(device.id())
            .with_buffers(fills)
            .with_buffers(strokes))
    }

    fn clear(&mut self, colour: Rgba) -> Result<(), RenderError> {
        self.staging = Staging::default();
        self.clear_colour = Some(colour);
        Ok(())
    }

    fn fill(&mut self, path: &Path, source: &Pattern) -> Result<(), RenderError> {
        let staging = &mut self.staging;
        let first = staging.fill_indices.len();
        let first_vertex = staging.fill_positions.len();
        for subpath in path.flatten() {
            if subpath.points.len() < 3 {
                continue;
            }
            let base = (staging.fill_positions.len() / 2) as u32;
            for &p in &subpath.points {
                Self::push_vertex(
                    &mut staging.fill_positions,
                    &mut staging.fill_colours,
                    p,
                    source,
                );
            }
            for i in 1..subpath.points.len() as u32 - 1 {
                staging.fill_indices.extend([base, base + i, base + i + 1]);
            }
        }
        let count = staging.fill_indices.len() - first;
        if count > 0 {
            staging.fill_batches.push(Batch {
                first,
                count,
                colour: source.sample(centroid(&staging.fill_positions[first_vertex..])),
                line_width: None,
            });
        }
        Ok(())
    }

    fn stroke(&mut self, path: &Path, source: &Pattern, line_width: f32) -> Result<(), RenderError> {
        let staging = &mut self.staging;
        let first = staging.stroke_positions.len() / 2;
        for subpath in path.flatten() {
            let points = &subpath.points;
            let closing = subpath.closed.then(|| (points[points.len() - 1], points[0]));
            let segments = points.windows(2).map(|w| (w[0], w[1])).chain(closing);
            for (a, b) in segments {
                for p in [a, b] {
                    Self::push_vertex(
                        &mut staging.stroke_positions,
                        &mut staging.stroke_colours,
                        p,
                        source,
                    );
                }
            }
        }
        let count = staging.stroke_positions.len() / 2 - first;
        if count > 0 {
            staging.stroke_batches.push(Batch {
                first,
                count,
                colour: source.sample(centroid(&staging.stroke_positions[first * 2..])),
                line_width: Some(line_width),
            });
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RenderError> {
        let staging = std::mem::take(&mut self.staging);
        self.fills
            .positions
            .borrow_mut()
            .update_owned(staging.fill_positions)?;
        self.fills.set.update_indices_u32(&staging.fill_indices)?;
        self.strokes
            .positions
            .borrow_mut()
            .update_owned(staging.stroke_positions)?;
        if let Some(colours) = &self.fills.colours {
            colours.borrow_mut().update_owned(staging.fill_colours)?;
        }
        if let Some(colours) = &self.strokes.colours {
            colours.borrow_mut().update_owned(staging.stroke_colours)?;
        }
        self.fill_batches = staging.fill_batches;
        self.stroke_batches = staging.stroke_batches;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A drawable vector graphics surface.
pub struct VectorContext {
    name: String,
    size: (u32, u32),
    order: Cell<i32>,
    backend: RefCell<Box<dyn VectorBackend>>,
    path: RefCell<Path>,
    state: RefCell<GraphicsState>,
    saved: RefCell<Vec<GraphicsState>>,
    params: RefCell<SceneNodeParams>,
    attachment: Attachment<()>,
}

impl VectorContext {
    pub fn new(name: &str, width: u32, height: u32, backend: Box<dyn VectorBackend>) -> Self {
        Self {
            name: name.to_string(),
            size: (width, height),
            order: Cell::new(0),
            backend: RefCell::new(backend),
            path: RefCell::default(),
            state: RefCell::default(),
            saved: RefCell::default(),
            params: RefCell::default(),
            attachment: Attachment::default(),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn set_order(&self, order: i32) {
        self.order.set(order);
    }

    pub fn backend_name(&self) -> String {
        self.backend.borrow().name().to_string()
    }

    /// Inspect the backend, e.g. by downcasting through `as_any`.
    pub fn with_backend<T>(&self, f: impl FnOnce(&dyn VectorBackend) -> T) -> T {
        f(self.backend.borrow().as_ref())
    }

    pub fn path(&self) -> Path {
        self.path.borrow().clone()
    }

    pub fn new_path(&self) {
        self.path.borrow_mut().clear();
    }

    pub fn move_to(&self, x: f32, y: f32) {
        self.path.borrow_mut().move_to(x, y);
    }

    pub fn line_to(&self, x: f32, y: f32) {
        self.path.borrow_mut().line_to(x, y);
    }

    pub fn curve_to(&self, x1: f32, y1: f32, x2: f32, y2: f32, x3: f32, y3: f32) {
        self.path.borrow_mut().curve_to(x1, y1, x2, y2, x3, y3);
    }

    pub fn arc(&self, xc: f32, yc: f32, radius: f32, angle1: f32, angle2: f32) {
        self.path.borrow_mut().arc(xc, yc, radius, angle1, angle2);
    }

    pub fn rectangle(&self, x: f32, y: f32, width: f32, height: f32) {
        self.path.borrow_mut().rectangle(x, y, width, height);
    }

    pub fn close_path(&self) {
        self.path.borrow_mut().close_path();
    }

    pub fn set_source(&self, source: Pattern) {
        self.state.borrow_mut().source = source;
    }

    pub fn set_source_rgba(&self, r: f32, g: f32, b: f32, a: f32) {
        self.set_source(Pattern::solid(r, g, b, a));
    }

    pub fn set_line_width(&self, width: f32) {
        self.state.borrow_mut().line_width = width;
    }

    pub fn state(&self) -> GraphicsState {
        self.state.borrow().clone()
    }

    pub fn save(&self) {
        let state = self.state();
        self.saved.borrow_mut().push(state);
    }

    pub fn restore(&self) {
        match self.saved.borrow_mut().pop() {
            Some(state) => *self.state.borrow_mut() = state,
            None => log::warn!("`{}`: restore without matching save", self.name),
        }
    }

    /// Fill the current path and start a new one.
    pub fn fill(&self) -> Result<(), RenderError> {
        let path = std::mem::take(&mut *self.path.borrow_mut());
        let source = self.state.borrow().source.clone();
        self.backend.borrow_mut().fill(&path, &source)
    }

    /// Stroke the current path and start a new one.
    pub fn stroke(&self) -> Result<(), RenderError> {
        let path = std::mem::take(&mut *self.path.borrow_mut());
        let state = self.state();
        self.backend
            .borrow_mut()
            .stroke(&path, &state.source, state.line_width)
    }

    pub fn clear(&self, colour: Rgba) -> Result<(), RenderError> {
        self.backend.borrow_mut().clear(colour)
    }

    pub fn flush(&self) -> Result<(), RenderError> {
        self.backend.borrow_mut().flush()
    }
}

impl Renderable for VectorContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn queue(&self) -> u32 {
        OVERLAY_QUEUE
    }

    fn order(&self) -> i32 {
        self.order.get()
    }

    fn attach(&self, device: &Rc<dyn DisplayDevice>) -> Result<DisplayDeviceDefinition, RenderError> {
        self.attachment.attach_with(&self.name, device, |device| {
            Ok((self.backend.borrow_mut().attach(device)?, ()))
        })
    }

    fn definition(&self) -> Option<DisplayDeviceDefinition> {
        self.attachment.definition()
    }

    fn set_scene_params(&self, params: &SceneNodeParams) {
        *self.params.borrow_mut() = params.clone();
    }

    fn scene_params(&self) -> SceneNodeParams {
        self.params.borrow().clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
