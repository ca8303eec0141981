//! Device stepper: GPU-offloaded generation advance
//!
//! Mirrors the cell grid into two device-side storage buffers and advances
//! generations with a compute kernel. The buffers ping-pong by re-binding
//! (two prebuilt bind groups, one per direction) rather than by copying, so
//! a generation costs one dispatch and zero device-to-device copies.
//!
//! Readback goes through a single staging buffer. In blocking mode the host
//! waits for the transfer; in polled mode the transfer is fired alongside
//! the dispatch and resolved on a later tick. While a readback is in flight
//! further generations may be dispatched back to back; a new readback is
//! only started once the previous one has been consumed, and completion
//! gates what becomes observable, never what is computed.
//!
//! Kernel execution time comes from timestamp queries around the compute
//! pass when the adapter supports them, scaled by the queue's timestamp
//! period, so host-side submission and transfer overhead is excluded.

use std::sync::Arc;
use std::time::Instant;

use futures::channel::oneshot;

use crate::error::{DeviceSetupError, StepError};
use crate::grid::Grid;
use crate::rules::RuleSet;
use crate::simulation::stepper::StepReport;

/// Cell-state buffers use one u32 per cell; WGSL storage arrays have no
/// byte element type. Values stay 0 or 255 to match the host bytes.
const BYTES_PER_CELL: u64 = std::mem::size_of::<u32>() as u64;

/// Uniform parameters for the kernel.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct KernelParams {
    width: u32,
    height: u32,
    birth_mask: u32,
    survival_mask: u32,
}

/// A delivered readback: which generation it carries and how long its
/// kernel pass took.
#[derive(Debug, Clone, Copy)]
pub struct CollectReport {
    pub generation: u64,
    pub report: StepReport,
}

/// A readback in flight: the generation it will deliver, the map-completion
/// channel, and the host time the dispatch was submitted (the timing
/// fallback when timestamp queries are unavailable).
struct PendingReadback {
    generation: u64,
    cells_rx: oneshot::Receiver<Result<(), wgpu::BufferAsyncError>>,
    ts_rx: Option<oneshot::Receiver<Result<(), wgpu::BufferAsyncError>>>,
    submitted_at: Instant,
}

/// GPU resources for the generation kernel.
pub struct DeviceStepper {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    width: u32,
    height: u32,
    workgroup: (u32, u32),

    pipeline: wgpu::ComputePipeline,
    // Ping-pong pair: `flipped == false` means A holds the current
    // (readable) generation and B is the write target.
    buffer_a: wgpu::Buffer,
    buffer_b: wgpu::Buffer,
    bind_a_to_b: wgpu::BindGroup,
    bind_b_to_a: wgpu::BindGroup,
    flipped: bool,

    staging: wgpu::Buffer,
    pending: Option<PendingReadback>,

    // Timestamp profiling, present when the device has TIMESTAMP_QUERY.
    timestamps: Option<TimestampResources>,

    /// Absolute generation held by the current (readable) device buffer.
    computed: u64,
    /// Absolute generation of the last readback delivered to the host.
    delivered: u64,
}

struct TimestampResources {
    query_set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    staging: wgpu::Buffer,
    period_ns: f32,
}

impl DeviceStepper {
    /// Build the kernel pipeline and device buffers on an existing device.
    ///
    /// The device is typically shared with the render engine. Kernel build
    /// failures are caught with a validation error scope and surfaced with
    /// the compiler log; they are fatal setup errors, not per-step errors.
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        width: u32,
        height: u32,
        workgroup: (u32, u32),
        rules: &RuleSet,
    ) -> Result<Self, DeviceSetupError> {
        let source = kernel_source(workgroup);

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Life Kernel"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(DeviceSetupError::KernelBuild {
                log: error.to_string(),
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Life Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Life Compute Pipeline"),
            layout: Some(
                &device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Life Pipeline Layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                }),
            ),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(DeviceSetupError::KernelBuild {
                log: error.to_string(),
            });
        }

        let cell_bytes = width as u64 * height as u64 * BYTES_PER_CELL;
        let make_cell_buffer = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: cell_bytes,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        let buffer_a = make_cell_buffer("Life Cells A");
        let buffer_b = make_cell_buffer("Life Cells B");

        let params = KernelParams {
            width,
            height,
            birth_mask: rules.birth_mask(),
            survival_mask: rules.survival_mask(),
        };
        let uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Life Params"),
            size: std::mem::size_of::<KernelParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&uniform, 0, bytemuck::cast_slice(&[params]));

        let make_bind_group = |label: &str, read: &wgpu::Buffer, write: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: read.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: write.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: uniform.as_entire_binding(),
                    },
                ],
            })
        };
        let bind_a_to_b = make_bind_group("Life Bind A->B", &buffer_a, &buffer_b);
        let bind_b_to_a = make_bind_group("Life Bind B->A", &buffer_b, &buffer_a);

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Life Staging"),
            size: cell_bytes,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let timestamps = if device.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
            Some(TimestampResources {
                query_set: device.create_query_set(&wgpu::QuerySetDescriptor {
                    label: Some("Life Kernel Timestamps"),
                    ty: wgpu::QueryType::Timestamp,
                    count: 2,
                }),
                resolve: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Life Timestamp Resolve"),
                    size: 16,
                    usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                }),
                staging: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Life Timestamp Staging"),
                    size: 16,
                    usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                    mapped_at_creation: false,
                }),
                period_ns: queue.get_timestamp_period(),
            })
        } else {
            log::warn!(
                "adapter lacks TIMESTAMP_QUERY; reporting host wall clock instead of kernel time"
            );
            None
        };

        Ok(Self {
            device,
            queue,
            width,
            height,
            workgroup,
            pipeline,
            buffer_a,
            buffer_b,
            bind_a_to_b,
            bind_b_to_a,
            flipped: false,
            staging,
            pending: None,
            timestamps,
            computed: 0,
            delivered: 0,
        })
    }

    /// Acquire a compute-capable device without a surface, for headless use.
    ///
    /// Timestamp queries are requested when the adapter offers them.
    pub fn request_headless_device(
    ) -> Result<(Arc<wgpu::Device>, Arc<wgpu::Queue>), DeviceSetupError> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|e| DeviceSetupError::AdapterUnavailable(e.to_string()))?;

            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("gridlife headless"),
                    required_features: adapter.features() & wgpu::Features::TIMESTAMP_QUERY,
                    required_limits: wgpu::Limits::downlevel_defaults(),
                    memory_hints: wgpu::MemoryHints::default(),
                    trace: wgpu::Trace::Off,
                })
                .await?;
            Ok((Arc::new(device), Arc::new(queue)))
        })
    }

    /// Absolute generation held by the current device buffer.
    pub fn computed_generation(&self) -> u64 {
        self.computed
    }

    /// Absolute generation of the last delivered readback.
    pub fn delivered_generation(&self) -> u64 {
        self.delivered
    }

    /// Whether a readback is still in flight.
    pub fn readback_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Push a host grid into the device as generation `generation`.
    ///
    /// The caller must have drained any pending readback first; uploading
    /// under an in-flight transfer would let a stale snapshot overwrite the
    /// new population later.
    pub fn upload(&mut self, grid: &Grid, generation: u64) {
        debug_assert!(self.pending.is_none(), "upload with readback in flight");
        debug_assert_eq!(grid.width(), self.width);
        debug_assert_eq!(grid.height(), self.height);

        let words: Vec<u32> = grid.cells().iter().map(|&c| c as u32).collect();
        self.queue
            .write_buffer(self.read_buffer(), 0, bytemuck::cast_slice(&words));
        self.computed = generation;
        self.delivered = generation;
    }

    /// Dispatch the kernel once: current generation in, next generation out,
    /// then swap roles by flipping which bind group the next dispatch uses.
    ///
    /// If no readback is in flight, a copy of the freshly written buffer
    /// into the staging buffer rides along in the same submission and a map
    /// is requested; [`collect`](Self::collect) resolves it. If one is in
    /// flight the dispatch proceeds without starting another, which is what
    /// lets generations pipeline ahead of the transfer. Failures surface on
    /// the readback side, in [`collect`](Self::collect).
    pub fn dispatch(&mut self) {
        let start_readback = self.pending.is_none();
        let submitted_at = Instant::now();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Life Dispatch Encoder"),
            });

        {
            let timestamp_writes = self.timestamps.as_ref().map(|t| wgpu::ComputePassTimestampWrites {
                query_set: &t.query_set,
                beginning_of_pass_write_index: Some(0),
                end_of_pass_write_index: Some(1),
            });
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Life Compute Pass"),
                timestamp_writes,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, self.active_bind_group(), &[]);
            let (wx, wy) = self.workgroup;
            pass.dispatch_workgroups(self.width.div_ceil(wx), self.height.div_ceil(wy), 1);
        }

        // The pass timestamps are resolved in the same submission, so a
        // later dispatch overwriting the query set cannot corrupt them.
        if start_readback {
            if let Some(t) = &self.timestamps {
                encoder.resolve_query_set(&t.query_set, 0..2, &t.resolve, 0);
                encoder.copy_buffer_to_buffer(&t.resolve, 0, &t.staging, 0, 16);
            }
            let written = self.write_buffer();
            encoder.copy_buffer_to_buffer(written, 0, &self.staging, 0, self.staging.size());
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.flipped = !self.flipped;
        self.computed += 1;

        if start_readback {
            let (cells_tx, cells_rx) = oneshot::channel();
            self.staging
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    let _ = cells_tx.send(result);
                });

            let ts_rx = self.timestamps.as_ref().map(|t| {
                let (ts_tx, ts_rx) = oneshot::channel();
                t.staging
                    .slice(..)
                    .map_async(wgpu::MapMode::Read, move |result| {
                        let _ = ts_tx.send(result);
                    });
                ts_rx
            });

            self.pending = Some(PendingReadback {
                generation: self.computed,
                cells_rx,
                ts_rx,
                submitted_at,
            });
        }
    }

    /// Start a readback of the current buffer without dispatching.
    ///
    /// No-op while a readback is in flight or when the host has already
    /// seen the newest computed generation. This is how the display catches
    /// up after pipelined dispatches stop (pause, single-step): the last
    /// dispatch may have skipped its readback because an older one was
    /// still pending.
    pub fn request_readback(&mut self) {
        if self.pending.is_some() || self.delivered == self.computed {
            return;
        }

        let submitted_at = Instant::now();
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Life Catch-up Encoder"),
            });
        encoder.copy_buffer_to_buffer(self.read_buffer(), 0, &self.staging, 0, self.staging.size());
        self.queue.submit(std::iter::once(encoder.finish()));

        let (cells_tx, cells_rx) = oneshot::channel();
        self.staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = cells_tx.send(result);
            });

        self.pending = Some(PendingReadback {
            generation: self.computed,
            cells_rx,
            // No kernel ran for this transfer; timing falls back to host.
            ts_rx: None,
            submitted_at,
        });
    }

    /// Try to resolve the pending readback into `target`.
    ///
    /// Returns `Ok(None)` when nothing is pending, or when `block` is false
    /// and the transfer has not completed yet. On delivery the target grid
    /// holds the readback's generation and the report carries the kernel
    /// time of the dispatch that produced it.
    pub fn collect(
        &mut self,
        target: &mut Grid,
        block: bool,
    ) -> Result<Option<CollectReport>, StepError> {
        if self.pending.is_none() {
            return Ok(None);
        }

        let poll_type = if block {
            wgpu::PollType::Wait
        } else {
            wgpu::PollType::Poll
        };
        self.device
            .poll(poll_type)
            .map_err(|e| self.step_error(format!("device poll failed: {e}")))?;

        let done = {
            let pending = self.pending.as_mut().expect("pending checked above");
            if block {
                match futures::executor::block_on(&mut pending.cells_rx) {
                    Ok(result) => Some(result),
                    Err(_cancelled) => {
                        return Err(self.step_error("readback channel dropped".into()))
                    }
                }
            } else {
                match pending.cells_rx.try_recv() {
                    Ok(maybe) => maybe,
                    Err(_cancelled) => {
                        return Err(self.step_error("readback channel dropped".into()))
                    }
                }
            }
        };

        let Some(map_result) = done else {
            return Ok(None);
        };
        let pending = self.pending.take().expect("pending checked above");
        map_result.map_err(|e| self.step_error(format!("readback map failed: {e}")))?;

        {
            let mapped = self.staging.slice(..).get_mapped_range();
            let words: &[u32] = bytemuck::cast_slice(&mapped);
            for (cell, &word) in target.cells_mut().iter_mut().zip(words) {
                *cell = word as u8;
            }
        }
        self.staging.unmap();

        let report = self.read_timing(pending.submitted_at, pending.ts_rx);
        self.delivered = pending.generation;
        Ok(Some(CollectReport {
            generation: pending.generation,
            report,
        }))
    }

    /// Wait out any pending readback and discard its snapshot.
    ///
    /// A dispatch already submitted is allowed to complete in the
    /// background; its result is simply not consumed. Used before reset
    /// re-seeds the device buffer, keeping the staging buffer unmapped.
    pub fn cancel_readback(&mut self) -> Result<(), StepError> {
        if self.pending.is_some() {
            let mut scratch = Grid::new(self.width, self.height)
                .expect("stepper dimensions validated at setup");
            self.collect(&mut scratch, true)?;
        }
        Ok(())
    }

    /// Blocking pull of the newest computed generation into `grid`.
    ///
    /// Drains any pending readback first (its snapshot may be older than
    /// the current buffer and is discarded), then copies the current buffer
    /// synchronously. Used when switching to the CPU stepper, which needs
    /// host state continuous with what the device computed.
    pub fn download_into(&mut self, grid: &mut Grid) -> Result<u64, StepError> {
        self.cancel_readback()?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Life Download Encoder"),
            });
        encoder.copy_buffer_to_buffer(self.read_buffer(), 0, &self.staging, 0, self.staging.size());
        self.queue.submit(std::iter::once(encoder.finish()));

        let (tx, rx) = oneshot::channel();
        self.staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| self.step_error(format!("device poll failed: {e}")))?;
        match futures::executor::block_on(rx) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.step_error(format!("download map failed: {e}"))),
            Err(_cancelled) => return Err(self.step_error("download channel dropped".into())),
        }

        {
            let mapped = self.staging.slice(..).get_mapped_range();
            let words: &[u32] = bytemuck::cast_slice(&mapped);
            for (cell, &word) in grid.cells_mut().iter_mut().zip(words) {
                *cell = word as u8;
            }
        }
        self.staging.unmap();

        self.delivered = self.computed;
        Ok(self.computed)
    }

    fn read_buffer(&self) -> &wgpu::Buffer {
        if self.flipped {
            &self.buffer_b
        } else {
            &self.buffer_a
        }
    }

    fn write_buffer(&self) -> &wgpu::Buffer {
        if self.flipped {
            &self.buffer_a
        } else {
            &self.buffer_b
        }
    }

    fn active_bind_group(&self) -> &wgpu::BindGroup {
        if self.flipped {
            &self.bind_b_to_a
        } else {
            &self.bind_a_to_b
        }
    }

    fn step_error(&self, reason: String) -> StepError {
        StepError {
            last_good_generation: self.delivered,
            reason,
        }
    }

    /// Kernel time from the resolved timestamps, or host wall clock since
    /// submission when the feature is missing or the map failed.
    ///
    /// The timestamp staging buffer was copied in the same submission as
    /// the cells, so by the time the cell map has completed its map has
    /// fired too; a `try_recv` here is enough.
    fn read_timing(
        &self,
        submitted_at: Instant,
        ts_rx: Option<oneshot::Receiver<Result<(), wgpu::BufferAsyncError>>>,
    ) -> StepReport {
        let host_ms = submitted_at.elapsed().as_secs_f64() * 1e3;
        let (Some(t), Some(mut rx)) = (self.timestamps.as_ref(), ts_rx) else {
            return StepReport::host(host_ms);
        };
        match rx.try_recv() {
            Ok(Some(Ok(()))) => {}
            _ => return StepReport::host(host_ms),
        }
        let ms = {
            let mapped = t.staging.slice(..).get_mapped_range();
            let ticks: &[u64] = bytemuck::cast_slice(&mapped);
            let delta = ticks[1].saturating_sub(ticks[0]);
            delta as f64 * t.period_ns as f64 / 1e6
        };
        t.staging.unmap();
        StepReport::device(ms)
    }
}

/// WGSL source for the generation kernel, workgroup size baked in.
///
/// The kernel reproduces the CPU stepper exactly: zero-padded finite
/// boundary, rule lookup through the birth/survival bitmasks.
fn kernel_source(workgroup: (u32, u32)) -> String {
    format!(
        r#"
struct Params {{
    width: u32,
    height: u32,
    birth_mask: u32,
    survival_mask: u32,
}}

@group(0) @binding(0) var<storage, read> current: array<u32>;
@group(0) @binding(1) var<storage, read_write> next: array<u32>;
@group(0) @binding(2) var<uniform> params: Params;

@compute @workgroup_size({wx}, {wy})
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let x = global_id.x;
    let y = global_id.y;
    if (x >= params.width || y >= params.height) {{
        return;
    }}

    // Neighbors outside the board count as dead; no wrapping.
    var live_neighbors = 0u;
    for (var dy: i32 = -1; dy <= 1; dy++) {{
        for (var dx: i32 = -1; dx <= 1; dx++) {{
            if (dx == 0 && dy == 0) {{
                continue;
            }}
            let nx = i32(x) + dx;
            let ny = i32(y) + dy;
            if (nx < 0 || ny < 0 || nx >= i32(params.width) || ny >= i32(params.height)) {{
                continue;
            }}
            if (current[u32(ny) * params.width + u32(nx)] != 0u) {{
                live_neighbors++;
            }}
        }}
    }}

    let index = y * params.width + x;
    let mask = select(params.birth_mask, params.survival_mask, current[index] != 0u);
    let alive = (mask >> live_neighbors) & 1u;
    next[index] = select(0u, 255u, alive == 1u);
}}
"#,
        wx = workgroup.0,
        wy = workgroup.1,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ALIVE;
    use crate::simulation::cpu::CpuStepper;
    use crate::simulation::stepper::TimingSource;

    fn stepper_for(grid: &Grid, rules: &RuleSet) -> DeviceStepper {
        let (device, queue) =
            DeviceStepper::request_headless_device().expect("test needs a GPU adapter");
        let mut stepper = DeviceStepper::new(
            device,
            queue,
            grid.width(),
            grid.height(),
            (8, 8),
            rules,
        )
        .expect("kernel should build");
        stepper.upload(grid, 0);
        stepper
    }

    #[test]
    fn kernel_source_embeds_workgroup() {
        let src = kernel_source((16, 4));
        assert!(src.contains("@workgroup_size(16, 4)"));
        assert!(src.contains("birth_mask"));
    }

    #[test]
    #[ignore = "requires a GPU"]
    fn upload_then_download_round_trips() {
        let mut grid = Grid::new(32, 32).unwrap();
        grid.seed_random(0.5, 42);
        let mut stepper = stepper_for(&grid, &RuleSet::conway());

        let mut back = Grid::new(32, 32).unwrap();
        let generation = stepper.download_into(&mut back).unwrap();
        assert_eq!(generation, 0);
        assert_eq!(back, grid);
    }

    #[test]
    #[ignore = "requires a GPU"]
    fn matches_cpu_stepper_over_many_generations() {
        let mut host = Grid::new(64, 48).unwrap();
        host.seed_random(0.35, 7);
        let rules = RuleSet::conway();
        let mut device_stepper = stepper_for(&host, &rules);
        let mut cpu = CpuStepper::new();

        let mut cpu_current = host.clone();
        let mut cpu_next = Grid::new(64, 48).unwrap();
        let mut device_result = Grid::new(64, 48).unwrap();

        for generation in 1..=8u64 {
            cpu.step(&cpu_current, &mut cpu_next, &rules);
            std::mem::swap(&mut cpu_current, &mut cpu_next);

            device_stepper.dispatch();
            let collected = device_stepper
                .collect(&mut device_result, true)
                .unwrap()
                .expect("blocking collect after dispatch must deliver");
            assert_eq!(collected.generation, generation);
            assert_eq!(
                device_result, cpu_current,
                "device diverged at generation {generation}"
            );
        }
    }

    #[test]
    #[ignore = "requires a GPU"]
    fn pipelined_dispatches_gate_observability() {
        let mut grid = Grid::new(32, 32).unwrap();
        grid.set(10, 10, ALIVE);
        grid.set(11, 10, ALIVE);
        grid.set(12, 10, ALIVE);
        let mut stepper = stepper_for(&grid, &RuleSet::conway());

        // Three dispatches back to back; only the first starts a readback.
        stepper.dispatch();
        stepper.dispatch();
        stepper.dispatch();
        assert_eq!(stepper.computed_generation(), 3);
        assert!(stepper.readback_pending());

        let mut seen = Grid::new(32, 32).unwrap();
        let collected = stepper.collect(&mut seen, true).unwrap().unwrap();
        // The delivered snapshot is generation 1, never newer than what the
        // transfer actually carried, and delivery never regresses.
        assert_eq!(collected.generation, 1);
        assert_eq!(stepper.delivered_generation(), 1);
        assert!(stepper.delivered_generation() <= stepper.computed_generation());
    }

    #[test]
    #[ignore = "requires a GPU"]
    fn timing_source_matches_device_features() {
        let mut grid = Grid::new(16, 16).unwrap();
        grid.seed_random(0.3, 1);
        let mut stepper = stepper_for(&grid, &RuleSet::conway());
        let has_timestamps = stepper.timestamps.is_some();

        stepper.dispatch();
        let mut out = Grid::new(16, 16).unwrap();
        let collected = stepper.collect(&mut out, true).unwrap().unwrap();
        let expected = if has_timestamps {
            TimingSource::DeviceTimestamp
        } else {
            TimingSource::HostWallClock
        };
        assert_eq!(collected.report.source, expected);
        assert!(collected.report.duration_ms >= 0.0);
    }
}
