//! Generation controller
//!
//! Owns the host-side double buffer and all playback state, and drives
//! whichever stepper is active once per display tick. The two grids swap
//! roles after every completed step; readers only ever see the buffer whose
//! write has finished. In device mode with polled readback, what the display
//! sees lags what the device has computed: completion of a readback is what
//! makes a generation observable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{ExecMode, PopulationSource, ReadbackMode, SimulationConfig};
use crate::error::{SetupError, StepError};
use crate::grid::{Grid, ALIVE};
use crate::pattern::Pattern;
use crate::rules::RuleSet;
use crate::simulation::cpu::CpuStepper;
use crate::simulation::gpu::DeviceStepper;
use crate::simulation::stepper::StepReport;

/// How fast faded cells decay per presented frame, out of 255.
const FADE_STEP: u8 = 32;

/// Playback and buffer orchestration for the simulation.
pub struct GenerationController {
    rules: RuleSet,
    grids: [Grid; 2],
    /// Index of the grid holding the displayed (completed) generation.
    current: usize,
    /// Snapshot taken right after seeding; `reset` restores it.
    seed_grid: Grid,

    cpu: CpuStepper,
    device: Option<DeviceStepper>,

    mode: ExecMode,
    readback: ReadbackMode,
    paused: bool,
    single_step: bool,

    /// Generations computed (dispatched) since the seed.
    generation: u64,
    /// Generation currently observable by the display.
    displayed_generation: u64,
    last_report: Option<StepReport>,

    interval: Duration,
    last_step_at: Option<Instant>,

    fade: bool,
    image: Vec<u8>,
    workgroup: (u32, u32),
}

impl GenerationController {
    /// Seed the host grids from the configured population source.
    ///
    /// Device resources are attached separately once a wgpu device exists
    /// (see [`setup_device`](Self::setup_device)); until then the controller
    /// can run CPU-only, which is what the unit tests do.
    pub fn new(config: &SimulationConfig) -> Result<Self, SetupError> {
        let mut grid = Grid::new(config.width, config.height)?;

        let rules = match &config.source {
            PopulationSource::Random { density, seed } => {
                grid.seed_random(*density, *seed);
                config.rule.unwrap_or_default()
            }
            PopulationSource::File(path) => {
                let pattern = Pattern::load(path)?;
                grid.seed_pattern(&pattern, None)?;
                // An explicit --rule beats the file header's rule.
                config
                    .rule
                    .or_else(|| pattern.rule())
                    .unwrap_or_default()
            }
        };

        log::info!(
            "seeded {}x{} board, {} live cells, rule {}",
            config.width,
            config.height,
            grid.population(),
            rules
        );

        let blank = Grid::new(config.width, config.height)?;
        let seed_grid = grid.clone();
        let image = vec![0; config.width as usize * config.height as usize * 4];

        let mut controller = Self {
            rules,
            grids: [grid, blank],
            current: 0,
            seed_grid,
            cpu: CpuStepper::new(),
            device: None,
            mode: config.mode,
            readback: config.readback,
            paused: false,
            single_step: false,
            generation: 0,
            displayed_generation: 0,
            last_report: None,
            interval: Duration::from_millis(config.interval_ms),
            last_step_at: None,
            fade: config.fade,
            image,
            workgroup: config.workgroup,
        };
        controller.refresh_image();
        Ok(controller)
    }

    /// Build the device stepper on the given device and push the current
    /// grid to it. Must be called before the first device-mode step; a
    /// failure here is fatal when device mode was requested at startup.
    pub fn setup_device(
        &mut self,
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
    ) -> Result<(), SetupError> {
        let mut stepper = DeviceStepper::new(
            device,
            queue,
            self.grids[0].width(),
            self.grids[0].height(),
            self.workgroup,
            &self.rules,
        )?;
        stepper.upload(&self.grids[self.current], self.generation);
        self.device = Some(stepper);
        Ok(())
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn readback(&self) -> ReadbackMode {
        self.readback
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn single_step_mode(&self) -> bool {
        self.single_step
    }

    /// Generation currently observable by the display.
    pub fn generation_count(&self) -> u64 {
        self.displayed_generation
    }

    /// Generations computed so far, including ones whose readback has not
    /// completed yet. Always >= `generation_count`.
    pub fn computed_generation(&self) -> u64 {
        self.generation
    }

    /// Duration of the last completed step in milliseconds.
    pub fn execution_time_ms(&self) -> Option<f64> {
        self.last_report.map(|r| r.duration_ms)
    }

    pub fn last_report(&self) -> Option<StepReport> {
        self.last_report
    }

    /// RGBA view of the displayed generation, valid until the next tick.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.grids[0].width()
    }

    pub fn height(&self) -> u32 {
        self.grids[0].height()
    }

    /// Drive the controller once. Called by the display loop every frame.
    ///
    /// Harvests a completed readback first (so results become visible even
    /// while paused), then advances a generation when running and the
    /// throttle allows. Returns whether the displayed image changed.
    pub fn tick(&mut self) -> Result<bool, StepError> {
        let mut presented = self.harvest_readback()?;

        if !self.paused && self.throttle_allows() {
            presented |= self.advance_one()?;
            self.last_step_at = Some(Instant::now());
            if self.single_step {
                self.paused = true;
            }
        }

        Ok(presented)
    }

    /// Execute exactly one generation while paused, staying paused.
    pub fn step_once(&mut self) -> Result<bool, StepError> {
        let mut presented = self.harvest_readback()?;
        presented |= self.advance_one()?;
        self.paused = true;
        Ok(presented)
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
        log::debug!("{}", if self.paused { "paused" } else { "running" });
    }

    pub fn toggle_single_step(&mut self) {
        self.single_step = !self.single_step;
    }

    /// Flip between blocking and polled readback. Takes effect on the next
    /// device step; an in-flight readback finishes on its own schedule.
    pub fn toggle_readback(&mut self) {
        self.readback = match self.readback {
            ReadbackMode::Blocking => ReadbackMode::Polled,
            ReadbackMode::Polled => ReadbackMode::Blocking,
        };
        log::info!("readback mode: {:?}", self.readback);
    }

    /// Switch between the CPU and device steppers.
    ///
    /// The visible grid state is continuous across the switch: moving to
    /// the CPU pulls the newest device generation into host memory first;
    /// moving to the device pushes the current host grid up. Fails when no
    /// device stepper is attached.
    pub fn toggle_mode(&mut self) -> Result<ExecMode, StepError> {
        match self.mode {
            ExecMode::Device => {
                if let Some(device) = self.device.as_mut() {
                    let generation = device.download_into(&mut self.grids[self.current])?;
                    self.generation = generation;
                    self.displayed_generation = generation;
                    self.refresh_image();
                }
                self.mode = ExecMode::Cpu;
            }
            ExecMode::Cpu => {
                let device = self.device.as_mut().ok_or_else(|| StepError {
                    last_good_generation: self.displayed_generation,
                    reason: "no device stepper attached".into(),
                })?;
                device.upload(&self.grids[self.current], self.generation);
                self.displayed_generation = self.generation;
                self.mode = ExecMode::Device;
            }
        }
        log::info!("stepper mode: {:?}", self.mode);
        Ok(self.mode)
    }

    /// Restore the grid to its seeded state and zero the counters.
    ///
    /// Valid in either state. Any pending readback is drained and its
    /// snapshot discarded before the device buffer is re-seeded.
    pub fn reset(&mut self) -> Result<(), StepError> {
        if let Some(device) = self.device.as_mut() {
            device.cancel_readback()?;
        }
        self.grids[self.current].copy_from_slice(self.seed_grid.cells());
        self.grids[1 - self.current].clear();
        self.generation = 0;
        self.displayed_generation = 0;
        self.last_report = None;
        self.last_step_at = None;
        if let Some(device) = self.device.as_mut() {
            device.upload(&self.seed_grid, 0);
        }
        self.image.fill(0);
        self.refresh_image();
        log::info!("reset to seeded population");
        Ok(())
    }

    fn throttle_allows(&self) -> bool {
        match (self.interval.is_zero(), self.last_step_at) {
            (true, _) | (_, None) => true,
            (false, Some(at)) => at.elapsed() >= self.interval,
        }
    }

    /// Poll (never block) for a completed device readback and present it.
    fn harvest_readback(&mut self) -> Result<bool, StepError> {
        let Some(device) = self.device.as_mut() else {
            return Ok(false);
        };
        if self.mode != ExecMode::Device {
            return Ok(false);
        }

        let back = 1 - self.current;
        let mut presented = false;
        if let Some(collected) = device.collect(&mut self.grids[back], false)? {
            self.present(back, collected.generation, collected.report);
            presented = true;
        }

        // Generations computed past the delivered snapshot with no transfer
        // in flight would otherwise never become visible (the dispatches
        // that computed them skipped their readback). Fire one now.
        if let Some(device) = self.device.as_mut() {
            device.request_readback();
        }
        Ok(presented)
    }

    /// Compute one generation with the active stepper.
    fn advance_one(&mut self) -> Result<bool, StepError> {
        match self.mode {
            ExecMode::Cpu => {
                let back = 1 - self.current;
                let (read, write) = split_pair(&mut self.grids, self.current);
                let report = self.cpu.step(read, write, &self.rules);
                self.generation += 1;
                self.present(back, self.generation, report);
                Ok(true)
            }
            ExecMode::Device => {
                let device = self.device.as_mut().ok_or_else(|| StepError {
                    last_good_generation: self.displayed_generation,
                    reason: "no device stepper attached".into(),
                })?;
                // Blocking mode presents the generation it just computed;
                // a leftover transfer from a polled episode would make the
                // dispatch skip its own readback and deliver stale state.
                if self.readback == ReadbackMode::Blocking {
                    device.cancel_readback()?;
                }
                device.dispatch();
                self.generation += 1;

                match self.readback {
                    ReadbackMode::Blocking => {
                        let back = 1 - self.current;
                        let collected = device
                            .collect(&mut self.grids[back], true)?
                            .expect("blocking collect after dispatch must deliver");
                        debug_assert_eq!(collected.generation, self.generation);
                        self.present(back, collected.generation, collected.report);
                        Ok(true)
                    }
                    // Polled: the dispatch is in flight; a later tick's
                    // harvest presents it.
                    ReadbackMode::Polled => Ok(false),
                }
            }
        }
    }

    /// Make `back` the displayed buffer, carrying generation `generation`.
    fn present(&mut self, back: usize, generation: u64, report: StepReport) {
        debug_assert!(
            generation >= self.displayed_generation,
            "observed image must never regress"
        );
        self.current = back;
        self.displayed_generation = generation;
        self.last_report = Some(report);
        self.refresh_image();
    }

    /// Expand the displayed grid into the RGBA image.
    ///
    /// With fade enabled, cells that died recently decay instead of
    /// blanking, a display-only trail: simulation state is untouched.
    fn refresh_image(&mut self) {
        let grid = &self.grids[self.current];
        for (cell, px) in grid.cells().iter().zip(self.image.chunks_exact_mut(4)) {
            let intensity = if self.fade && *cell != ALIVE {
                px[0].saturating_sub(FADE_STEP)
            } else {
                *cell
            };
            px[0] = intensity;
            px[1] = intensity;
            px[2] = intensity;
            px[3] = 255;
        }
    }
}

/// Borrow the read and write halves of the double buffer.
fn split_pair(grids: &mut [Grid; 2], current: usize) -> (&Grid, &mut Grid) {
    let (a, b) = grids.split_at_mut(1);
    if current == 0 {
        (&a[0], &mut b[0])
    } else {
        (&b[0], &mut a[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Cli, SimulationConfig};
    use clap::Parser;

    fn cpu_config(args: &[&str]) -> SimulationConfig {
        let mut argv = vec!["gridlife", "--cpu"];
        argv.extend_from_slice(args);
        SimulationConfig::from_cli(Cli::try_parse_from(argv).unwrap()).unwrap()
    }

    fn cpu_controller(args: &[&str]) -> GenerationController {
        GenerationController::new(&cpu_config(args)).unwrap()
    }

    #[test]
    fn counter_matches_ticks() {
        let mut controller = cpu_controller(&["64", "--random", "0.3"]);
        for _ in 0..10 {
            controller.tick().unwrap();
        }
        assert_eq!(controller.generation_count(), 10);
        assert_eq!(controller.computed_generation(), 10);
    }

    #[test]
    fn paused_controller_does_not_advance() {
        let mut controller = cpu_controller(&["32"]);
        controller.toggle_pause();
        assert!(controller.is_paused());
        for _ in 0..5 {
            controller.tick().unwrap();
        }
        assert_eq!(controller.generation_count(), 0);
    }

    #[test]
    fn single_step_mode_pauses_after_each_generation() {
        let mut controller = cpu_controller(&["32", "--random", "0.3"]);
        controller.toggle_single_step();
        controller.tick().unwrap();
        assert_eq!(controller.generation_count(), 1);
        assert!(controller.is_paused());
        // Further ticks do nothing until unpaused again.
        controller.tick().unwrap();
        assert_eq!(controller.generation_count(), 1);
        controller.toggle_pause();
        controller.tick().unwrap();
        assert_eq!(controller.generation_count(), 2);
        assert!(controller.is_paused());
    }

    #[test]
    fn step_once_stays_paused() {
        let mut controller = cpu_controller(&["32", "--random", "0.3"]);
        controller.toggle_pause();
        controller.step_once().unwrap();
        assert_eq!(controller.generation_count(), 1);
        assert!(controller.is_paused());
    }

    #[test]
    fn reset_restores_seeded_state_bit_identically() {
        let mut controller = cpu_controller(&["48", "--random", "0.4", "--seed", "11"]);
        let seeded = controller.grids[controller.current].clone();
        let seeded_image = controller.image().to_vec();
        for _ in 0..7 {
            controller.tick().unwrap();
        }
        assert_ne!(controller.grids[controller.current], seeded);

        controller.reset().unwrap();
        assert_eq!(controller.generation_count(), 0);
        assert_eq!(controller.computed_generation(), 0);
        assert_eq!(controller.grids[controller.current], seeded);
        assert_eq!(controller.image(), &seeded_image[..]);
    }

    #[test]
    fn throttle_blocks_back_to_back_steps() {
        let mut controller = cpu_controller(&["32", "--interval", "60000"]);
        controller.tick().unwrap();
        controller.tick().unwrap();
        controller.tick().unwrap();
        // The first tick steps (no previous step time), the rest wait out
        // the interval.
        assert_eq!(controller.generation_count(), 1);
    }

    #[test]
    fn image_tracks_cells() {
        let mut controller = cpu_controller(&["16", "--random", "1.0"]);
        let image = controller.image();
        assert_eq!(image.len(), 16 * 16 * 4);
        assert!(image.chunks_exact(4).all(|px| px == [255, 255, 255, 255]));

        // Full board dies of overpopulation in the interior; after one tick
        // the image must match the new grid, not the old one.
        controller.tick().unwrap();
        let grid = controller.grids[controller.current].clone();
        for (cell, px) in grid.cells().iter().zip(controller.image().chunks_exact(4)) {
            assert_eq!(px[0], *cell);
            assert_eq!(px[3], 255);
        }
    }

    #[test]
    fn mode_toggle_without_device_fails() {
        let mut controller = cpu_controller(&["32"]);
        assert!(controller.toggle_mode().is_err());
        assert_eq!(controller.mode(), ExecMode::Cpu);
    }

    #[test]
    #[ignore = "requires a GPU"]
    fn device_mode_counter_and_gating() {
        let config = {
            let argv = vec!["gridlife", "64", "--random", "0.3"];
            SimulationConfig::from_cli(Cli::try_parse_from(argv).unwrap()).unwrap()
        };
        let mut controller = GenerationController::new(&config).unwrap();
        let (device, queue) = DeviceStepper::request_headless_device().unwrap();
        controller.setup_device(device, queue).unwrap();

        for _ in 0..20 {
            controller.tick().unwrap();
            assert!(controller.generation_count() <= controller.computed_generation());
        }
        // Drain: pause and keep polling until the display catches up.
        controller.toggle_pause();
        let computed = controller.computed_generation();
        for _ in 0..1000 {
            controller.tick().unwrap();
            if controller.generation_count() == computed {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(controller.generation_count(), computed);
    }

    #[test]
    #[ignore = "requires a GPU"]
    fn mode_switch_is_continuous() {
        // N generations on the CPU then one on the device must equal N+1
        // generations computed on the device alone.
        let config = {
            let argv = vec!["gridlife", "48", "--random", "0.35", "--seed", "5", "--sync"];
            SimulationConfig::from_cli(Cli::try_parse_from(argv).unwrap()).unwrap()
        };
        let (device, queue) = DeviceStepper::request_headless_device().unwrap();

        // Reference: all generations on the device.
        let mut reference = GenerationController::new(&config).unwrap();
        reference.setup_device(device.clone(), queue.clone()).unwrap();
        for _ in 0..6 {
            reference.tick().unwrap();
        }

        // Mixed: start on the CPU, switch, take the last step on the device.
        let mut mixed = GenerationController::new(&config).unwrap();
        mixed.setup_device(device, queue).unwrap();
        mixed.toggle_mode().unwrap();
        assert_eq!(mixed.mode(), ExecMode::Cpu);
        for _ in 0..5 {
            mixed.tick().unwrap();
        }
        mixed.toggle_mode().unwrap();
        mixed.tick().unwrap();

        assert_eq!(mixed.generation_count(), reference.generation_count());
        assert_eq!(
            mixed.grids[mixed.current], reference.grids[reference.current],
            "mode switch broke state continuity"
        );
    }
}
