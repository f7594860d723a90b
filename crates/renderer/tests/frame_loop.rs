//! Drives `FrameSynchronizer` against a scripted backend that records every
//! GPU operation, checking ordering and backpressure without a device.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use vkpbr_renderer::{
    FrameBackend, FrameOutcome, FrameSlotIndex, FrameSynchronizer, SceneRecorder, SkipReason,
    SlotState,
};
use vkpbr_rhi::swapchain::{AcquireOutcome, SwapImageIndex, SwapchainStatus};
use vkpbr_rhi::sync::Timeout;
use vkpbr_rhi::{RhiError, RhiResult, vk};

const MIN_EXTENT: vk::Extent2D = vk::Extent2D {
    width: 2,
    height: 2,
};

fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Event {
    WaitFence(usize),
    ResetFence(usize),
    Acquire { semaphore: usize, image: Option<u32> },
    Begin(u32),
    End(u32),
    Submit {
        cmd: u32,
        wait: usize,
        signal: usize,
        fence: usize,
    },
    Present { image: u32, wait: usize },
    WaitIdle,
    Recreate(vk::Extent2D),
}

#[derive(Debug)]
struct FakeFence(usize);

#[derive(Debug)]
struct FakeSemaphore(usize);

#[derive(Debug)]
struct FakeCommandBuffer(u32);

#[derive(Clone, Copy, Debug, Default)]
struct FenceState {
    signaled: bool,
    /// Submitted and not yet observed complete.
    pending: bool,
}

/// Scripted responses keyed by the zero-based call number.
#[derive(Default)]
struct Script {
    acquire: HashMap<usize, AcquireOutcome>,
    present: HashMap<usize, SwapchainStatus>,
    image_count_after_recreate: Option<u32>,
    /// Recreations that find the surface at zero area.
    hidden_surface_recreates: usize,
    gpu_hung: bool,
}

struct FakeBackend {
    log: Rc<RefCell<Vec<Event>>>,
    fences: Vec<FenceState>,
    semaphores: usize,
    image_count: u32,
    next_image: u32,
    acquires: usize,
    presents: usize,
    max_in_flight: usize,
    script: Script,
}

impl FakeBackend {
    fn new(image_count: u32, script: Script) -> (Self, Rc<RefCell<Vec<Event>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let backend = Self {
            log: log.clone(),
            fences: Vec::new(),
            semaphores: 0,
            image_count,
            next_image: 0,
            acquires: 0,
            presents: 0,
            max_in_flight: 0,
            script,
        };
        (backend, log)
    }

    fn push(&self, event: Event) {
        self.log.borrow_mut().push(event);
    }

    fn in_flight(&self) -> usize {
        self.fences.iter().filter(|f| f.pending).count()
    }
}

impl FrameBackend for FakeBackend {
    type Fence = FakeFence;
    type Semaphore = FakeSemaphore;
    type CommandBuffer = FakeCommandBuffer;

    fn create_fence(&mut self, signaled: bool) -> RhiResult<FakeFence> {
        self.fences.push(FenceState {
            signaled,
            pending: false,
        });
        Ok(FakeFence(self.fences.len() - 1))
    }

    fn create_semaphore(&mut self) -> RhiResult<FakeSemaphore> {
        self.semaphores += 1;
        Ok(FakeSemaphore(self.semaphores - 1))
    }

    fn command_buffer(&mut self, slot: FrameSlotIndex) -> RhiResult<FakeCommandBuffer> {
        Ok(FakeCommandBuffer(slot.get()))
    }

    fn wait_fence(&mut self, fence: &FakeFence, timeout: Timeout) -> RhiResult<()> {
        self.push(Event::WaitFence(fence.0));
        let state = &mut self.fences[fence.0];
        let completes = state.pending && !self.script.gpu_hung;
        if completes {
            state.pending = false;
            state.signaled = true;
        }
        if state.signaled {
            return Ok(());
        }
        match timeout {
            Timeout::Nanos(_) => Err(RhiError::Timeout("vkWaitForFences")),
            // An unsignaled fence with nothing pending never signals.
            Timeout::Infinite => panic!("deadlock: infinite wait on fence {}", fence.0),
        }
    }

    fn reset_fence(&mut self, fence: &FakeFence) -> RhiResult<()> {
        self.push(Event::ResetFence(fence.0));
        self.fences[fence.0].signaled = false;
        Ok(())
    }

    fn acquire_next_image(
        &mut self,
        signal: &FakeSemaphore,
        timeout: Timeout,
    ) -> RhiResult<AcquireOutcome> {
        let call = self.acquires;
        self.acquires += 1;

        if self.script.gpu_hung && matches!(timeout, Timeout::Nanos(_)) {
            return Err(RhiError::Timeout("vkAcquireNextImageKHR"));
        }

        let outcome = match self.script.acquire.get(&call).copied() {
            Some(scripted) => scripted,
            None => {
                let image = SwapImageIndex::new(self.next_image);
                self.next_image = (self.next_image + 1) % self.image_count;
                AcquireOutcome::Ready(image)
            }
        };
        self.push(Event::Acquire {
            semaphore: signal.0,
            image: outcome.image().map(SwapImageIndex::get),
        });
        Ok(outcome)
    }

    fn begin_commands(&mut self, cmd: &FakeCommandBuffer) -> RhiResult<()> {
        self.push(Event::Begin(cmd.0));
        Ok(())
    }

    fn end_commands(&mut self, cmd: &FakeCommandBuffer) -> RhiResult<()> {
        self.push(Event::End(cmd.0));
        Ok(())
    }

    fn submit(
        &mut self,
        cmd: &FakeCommandBuffer,
        wait: &FakeSemaphore,
        signal: &FakeSemaphore,
        fence: &FakeFence,
    ) -> RhiResult<()> {
        self.push(Event::Submit {
            cmd: cmd.0,
            wait: wait.0,
            signal: signal.0,
            fence: fence.0,
        });
        let state = &mut self.fences[fence.0];
        assert!(!state.signaled, "submitted with a signaled fence");
        assert!(!state.pending, "fence {} submitted twice", fence.0);
        state.pending = true;
        self.max_in_flight = self.max_in_flight.max(self.in_flight());
        Ok(())
    }

    fn present(&mut self, image: SwapImageIndex, wait: &FakeSemaphore) -> RhiResult<SwapchainStatus> {
        let call = self.presents;
        self.presents += 1;
        self.push(Event::Present {
            image: image.get(),
            wait: wait.0,
        });
        Ok(self
            .script
            .present
            .get(&call)
            .copied()
            .unwrap_or(SwapchainStatus::Ok))
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.push(Event::WaitIdle);
        for fence in &mut self.fences {
            if fence.pending {
                fence.pending = false;
                fence.signaled = true;
            }
        }
        Ok(())
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<Option<vk::Extent2D>> {
        assert_eq!(self.in_flight(), 0, "recreated while frames were in flight");
        if self.script.hidden_surface_recreates > 0 {
            self.script.hidden_surface_recreates -= 1;
            return Ok(None);
        }
        let clamped = vk::Extent2D {
            width: extent.width.max(MIN_EXTENT.width),
            height: extent.height.max(MIN_EXTENT.height),
        };
        self.push(Event::Recreate(clamped));
        if let Some(count) = self.script.image_count_after_recreate {
            self.image_count = count;
        }
        self.next_image = 0;
        Ok(Some(clamped))
    }

    fn image_count(&self) -> u32 {
        self.image_count
    }
}

#[derive(Default)]
struct RecordingScene {
    recorded: Vec<(SwapImageIndex, FrameSlotIndex)>,
    resizes: Vec<vk::Extent2D>,
    fail_next: bool,
}

impl SceneRecorder<FakeBackend> for RecordingScene {
    fn record_into(
        &mut self,
        backend: &FakeBackend,
        cmd: &FakeCommandBuffer,
        image: SwapImageIndex,
        slot: FrameSlotIndex,
    ) -> RhiResult<()> {
        assert_eq!(cmd.0, slot.get(), "command buffer belongs to another slot");
        assert!(image.get() < backend.image_count());
        if std::mem::take(&mut self.fail_next) {
            return Err(RhiError::ResourceUnavailable {
                what: "test scene",
                reason: "scripted failure".into(),
            });
        }
        self.recorded.push((image, slot));
        Ok(())
    }

    fn on_resize(&mut self, _backend: &FakeBackend, extent: vk::Extent2D) -> RhiResult<()> {
        self.resizes.push(extent);
        Ok(())
    }
}

fn synchronizer(
    render_ahead: u32,
    script: Script,
) -> (FrameSynchronizer<FakeBackend>, Rc<RefCell<Vec<Event>>>) {
    let (backend, log) = FakeBackend::new(render_ahead + 1, script);
    let frames = FrameSynchronizer::new(backend, render_ahead, extent(800, 600))
        .expect("fake backend cannot fail");
    (frames, log)
}

fn count(log: &[Event], predicate: impl Fn(&Event) -> bool) -> usize {
    log.iter().filter(|e| predicate(e)).count()
}

fn presented_slot(outcome: FrameOutcome) -> Option<u32> {
    match outcome {
        FrameOutcome::Presented { slot, .. } => Some(slot.get()),
        FrameOutcome::Skipped(_) => None,
    }
}

#[test]
fn ten_frames_present_ten_times() {
    let (mut frames, log) = synchronizer(2, Script::default());
    let mut scene = RecordingScene::default();

    for _ in 0..10 {
        let outcome = frames.render_frame(&mut scene).unwrap();
        assert!(matches!(outcome, FrameOutcome::Presented { recreated: false, .. }));
    }

    let log = log.borrow();
    assert_eq!(count(&log, |e| matches!(e, Event::Present { .. })), 10);
    assert_eq!(count(&log, |e| matches!(e, Event::Submit { .. })), 10);
    assert_eq!(count(&log, |e| matches!(e, Event::Recreate(_))), 0);
    assert_eq!(frames.stats().presented, 10);

    let image_count = frames.backend().image_count();
    for (image, _) in &scene.recorded {
        assert!(image.get() < image_count);
    }
}

#[test]
fn every_fence_wait_follows_exactly_one_submission_of_its_slot() {
    let (mut frames, log) = synchronizer(2, Script::default());
    let mut scene = RecordingScene::default();
    for _ in 0..10 {
        frames.render_frame(&mut scene).unwrap();
    }

    let mut submitted_since_wait: HashMap<usize, usize> = HashMap::new();
    let mut waits: HashMap<usize, usize> = HashMap::new();
    for event in log.borrow().iter() {
        match *event {
            Event::Submit { fence, .. } => *submitted_since_wait.entry(fence).or_default() += 1,
            Event::WaitFence(fence) => {
                let previous_waits = waits.entry(fence).or_default();
                let submitted = submitted_since_wait.remove(&fence).unwrap_or(0);
                // The first wait on each slot sees the initially signaled fence.
                let expected = if *previous_waits == 0 { 0 } else { 1 };
                assert_eq!(submitted, expected, "fence {fence} wait #{previous_waits}");
                *previous_waits += 1;
            }
            _ => {}
        }
    }
}

#[test]
fn in_flight_frames_never_exceed_render_ahead() {
    for render_ahead in 1..=4 {
        let (mut frames, _log) = synchronizer(render_ahead, Script::default());
        let mut scene = RecordingScene::default();
        for _ in 0..12 {
            frames.render_frame(&mut scene).unwrap();
            assert!(frames.in_flight() <= render_ahead as usize);
        }
        assert_eq!(frames.backend().max_in_flight, render_ahead as usize);
    }
}

#[test]
fn frame_index_cycles_through_every_slot() {
    let (mut frames, _log) = synchronizer(3, Script::default());
    let mut scene = RecordingScene::default();

    let slots: Vec<u32> = (0..9)
        .filter_map(|_| presented_slot(frames.render_frame(&mut scene).unwrap()))
        .collect();
    assert_eq!(slots, [0, 1, 2, 0, 1, 2, 0, 1, 2]);
}

#[test]
fn semaphores_and_fences_follow_the_slot_not_the_image() {
    let script = Script {
        // Images come back out of order relative to slots.
        acquire: HashMap::from([
            (0, AcquireOutcome::Ready(SwapImageIndex::new(2))),
            (1, AcquireOutcome::Ready(SwapImageIndex::new(0))),
            (2, AcquireOutcome::Ready(SwapImageIndex::new(1))),
        ]),
        ..Script::default()
    };
    let (mut frames, log) = synchronizer(2, script);
    let mut scene = RecordingScene::default();
    for _ in 0..3 {
        frames.render_frame(&mut scene).unwrap();
    }

    let log = log.borrow();
    let submits: Vec<_> = log
        .iter()
        .filter_map(|e| match *e {
            Event::Submit {
                cmd,
                wait,
                signal,
                fence,
            } => Some((cmd, wait, signal, fence)),
            _ => None,
        })
        .collect();
    // Slot i owns fence i and semaphores 2i (present) and 2i+1 (render).
    assert_eq!(submits, [(0, 0, 1, 0), (1, 2, 3, 1), (0, 0, 1, 0)]);

    let presents: Vec<_> = log
        .iter()
        .filter_map(|e| match *e {
            Event::Present { image, wait } => Some((image, wait)),
            _ => None,
        })
        .collect();
    assert_eq!(presents, [(2, 1), (0, 3), (1, 1)]);
}

#[test]
fn out_of_date_acquire_skips_and_retries_same_slot() {
    let script = Script {
        acquire: HashMap::from([(4, AcquireOutcome::OutOfDate)]),
        image_count_after_recreate: Some(4),
        ..Script::default()
    };
    let (mut frames, log) = synchronizer(2, script);
    let mut scene = RecordingScene::default();

    for _ in 0..4 {
        frames.render_frame(&mut scene).unwrap();
    }
    let index_before = frames.frame_index();
    let events_before = log.borrow().len();

    // Frame 5 hits the invalidated swapchain.
    let outcome = frames.render_frame(&mut scene).unwrap();
    assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::SwapchainRecreated));
    assert_eq!(frames.frame_index(), index_before);

    {
        let log = log.borrow();
        let frame_five = &log[events_before..];
        assert_eq!(count(frame_five, |e| matches!(e, Event::Recreate(_))), 1);
        assert_eq!(count(frame_five, |e| matches!(e, Event::Submit { .. })), 0);
        assert_eq!(count(frame_five, |e| matches!(e, Event::Present { .. })), 0);
        assert_eq!(count(frame_five, |e| matches!(e, Event::ResetFence(_))), 0);
        let idle = frame_five.iter().position(|e| *e == Event::WaitIdle).unwrap();
        let recreate = frame_five
            .iter()
            .position(|e| matches!(e, Event::Recreate(_)))
            .unwrap();
        assert!(idle < recreate, "recreation must follow a device idle wait");
    }
    assert_eq!(scene.resizes, [extent(800, 600)]);

    // The retried frame uses the same slot and the new image range.
    let outcome = frames.render_frame(&mut scene).unwrap();
    let FrameOutcome::Presented { slot, image, .. } = outcome else {
        panic!("retried frame should present, got {outcome:?}");
    };
    assert_eq!(slot, index_before);
    assert!(image.get() < 4);

    for _ in 0..4 {
        frames.render_frame(&mut scene).unwrap();
    }
    let log = log.borrow();
    assert_eq!(count(&log, |e| matches!(e, Event::Present { .. })), 9);
    assert_eq!(count(&log, |e| matches!(e, Event::Recreate(_))), 1);
    assert_eq!(frames.stats().recreations, 1);
    assert_eq!(frames.stats().skipped, 1);
}

#[test]
fn repeated_invalidation_keeps_slot_sequence() {
    let script = Script {
        acquire: HashMap::from([
            (1, AcquireOutcome::OutOfDate),
            (2, AcquireOutcome::OutOfDate),
            (6, AcquireOutcome::OutOfDate),
        ]),
        ..Script::default()
    };
    let (mut frames, _log) = synchronizer(3, script);
    let mut scene = RecordingScene::default();

    let slots: Vec<u32> = (0..10)
        .filter_map(|_| presented_slot(frames.render_frame(&mut scene).unwrap()))
        .collect();
    assert_eq!(slots, [0, 1, 2, 0, 1, 2, 0]);
}

#[test]
fn suboptimal_acquire_renders_then_recreates() {
    let script = Script {
        acquire: HashMap::from([(0, AcquireOutcome::Suboptimal(SwapImageIndex::new(1)))]),
        ..Script::default()
    };
    let (mut frames, log) = synchronizer(2, script);
    let mut scene = RecordingScene::default();

    let outcome = frames.render_frame(&mut scene).unwrap();
    assert_eq!(
        outcome,
        FrameOutcome::Presented {
            slot: FrameSlotIndex::new(0),
            image: SwapImageIndex::new(1),
            recreated: true,
        }
    );
    assert_eq!(frames.frame_index(), FrameSlotIndex::new(1));

    let log = log.borrow();
    let present = log.iter().position(|e| matches!(e, Event::Present { .. })).unwrap();
    let recreate = log.iter().position(|e| matches!(e, Event::Recreate(_))).unwrap();
    assert!(present < recreate);
}

#[test]
fn out_of_date_present_recreates_after_advancing() {
    let script = Script {
        present: HashMap::from([(1, SwapchainStatus::OutOfDate)]),
        ..Script::default()
    };
    let (mut frames, _log) = synchronizer(2, script);
    let mut scene = RecordingScene::default();

    frames.render_frame(&mut scene).unwrap();
    let outcome = frames.render_frame(&mut scene).unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { recreated: true, .. }));
    assert_eq!(frames.frame_index(), FrameSlotIndex::new(0));
    assert_eq!(scene.resizes.len(), 1);
    // Recreation idled the device, so nothing is in flight.
    assert_eq!(frames.in_flight(), 0);
    assert_eq!(frames.slot_state(FrameSlotIndex::new(1)), Some(SlotState::Idle));
}

#[test]
fn resize_request_recreates_with_clamped_extent() {
    let (mut frames, log) = synchronizer(2, Script::default());
    let mut scene = RecordingScene::default();

    frames.render_frame(&mut scene).unwrap();
    frames.request_resize(extent(1, 1));
    let outcome = frames.render_frame(&mut scene).unwrap();

    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    assert_eq!(scene.resizes, [MIN_EXTENT]);
    let log = log.borrow();
    let recreate = log.iter().position(|e| matches!(e, Event::Recreate(_))).unwrap();
    let last_acquire = log.iter().rposition(|e| matches!(e, Event::Acquire { .. })).unwrap();
    assert!(recreate < last_acquire, "resize is applied before acquiring");
}

#[test]
fn minimized_window_skips_until_restored() {
    let (mut frames, log) = synchronizer(2, Script::default());
    let mut scene = RecordingScene::default();

    frames.request_resize(extent(0, 600));
    for _ in 0..3 {
        let outcome = frames.render_frame(&mut scene).unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::Minimized));
    }
    assert!(log.borrow().is_empty());

    frames.request_resize(extent(640, 480));
    let outcome = frames.render_frame(&mut scene).unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    assert_eq!(scene.resizes, [extent(640, 480)]);
}

#[test]
fn finite_timeout_surfaces_on_hung_gpu() {
    let (backend, _log) = FakeBackend::new(3, Script::default());
    let mut frames = FrameSynchronizer::new(backend, 2, extent(800, 600))
        .unwrap()
        .with_timeout(Timeout::Nanos(1_000_000));
    let mut scene = RecordingScene::default();

    frames.render_frame(&mut scene).unwrap();
    frames.render_frame(&mut scene).unwrap();
    frames.backend_mut().script.gpu_hung = true;

    // Slot 0's submission never completes.
    let error = frames.render_frame(&mut scene).unwrap_err();
    assert!(matches!(error, RhiError::Timeout("vkWaitForFences")));
    assert!(error.is_fatal());
}

#[test]
fn failed_recording_leaves_fence_signaled() {
    let (mut frames, log) = synchronizer(1, Script::default());
    let mut scene = RecordingScene {
        fail_next: true,
        ..RecordingScene::default()
    };

    assert!(frames.render_frame(&mut scene).is_err());
    assert_eq!(count(&log.borrow(), |e| matches!(e, Event::ResetFence(_))), 0);
    assert_eq!(count(&log.borrow(), |e| matches!(e, Event::Submit { .. })), 0);
}

#[test]
fn acquired_index_out_of_range_is_rejected() {
    let script = Script {
        acquire: HashMap::from([(0, AcquireOutcome::Ready(SwapImageIndex::new(7)))]),
        ..Script::default()
    };
    let (mut frames, log) = synchronizer(2, script);
    let mut scene = RecordingScene::default();

    let error = frames.render_frame(&mut scene).unwrap_err();
    assert!(matches!(error, RhiError::ResourceUnavailable { what: "swapchain image", .. }));
    assert_eq!(count(&log.borrow(), |e| matches!(e, Event::Begin(_))), 0);
}

#[test]
fn zero_render_ahead_is_a_fatal_config_error() {
    let (backend, _log) = FakeBackend::new(2, Script::default());
    let Err(error) = FrameSynchronizer::new(backend, 0, extent(800, 600)) else {
        panic!("render_ahead = 0 must be rejected");
    };
    assert!(matches!(error, RhiError::InvalidConfig(_)));
    assert!(error.is_fatal());
}

#[test]
fn zero_area_surface_after_present_defers_recreation() {
    // The window still reports 800x600 while the surface is already 0x0.
    let script = Script {
        present: HashMap::from([(1, SwapchainStatus::OutOfDate)]),
        hidden_surface_recreates: 2,
        ..Script::default()
    };
    let (mut frames, log) = synchronizer(2, script);
    let mut scene = RecordingScene::default();

    frames.render_frame(&mut scene).unwrap();
    let outcome = frames.render_frame(&mut scene).unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { recreated: false, .. }));
    assert_eq!(frames.frame_index(), FrameSlotIndex::new(0));

    // Still hidden: the pending rebuild skips the frame before acquiring.
    let acquires_before = count(&log.borrow(), |e| matches!(e, Event::Acquire { .. }));
    let outcome = frames.render_frame(&mut scene).unwrap();
    assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::Minimized));
    assert_eq!(
        count(&log.borrow(), |e| matches!(e, Event::Acquire { .. })),
        acquires_before
    );
    assert!(scene.resizes.is_empty());
    assert_eq!(frames.backend().image_count(), 3);

    // The surface is back: the deferred rebuild runs and the frame presents.
    let outcome = frames.render_frame(&mut scene).unwrap();
    let FrameOutcome::Presented { slot, .. } = outcome else {
        panic!("restored surface should present, got {outcome:?}");
    };
    assert_eq!(slot, FrameSlotIndex::new(0));
    assert_eq!(scene.resizes, [extent(800, 600)]);
    assert_eq!(frames.stats().recreations, 1);
    assert_eq!(frames.stats().skipped, 1);
}

#[test]
fn zero_area_surface_at_acquire_skips_as_minimized() {
    let script = Script {
        acquire: HashMap::from([(0, AcquireOutcome::OutOfDate)]),
        hidden_surface_recreates: 1,
        ..Script::default()
    };
    let (mut frames, log) = synchronizer(2, script);
    let mut scene = RecordingScene::default();

    let outcome = frames.render_frame(&mut scene).unwrap();
    assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::Minimized));
    assert_eq!(frames.frame_index(), FrameSlotIndex::new(0));
    assert_eq!(count(&log.borrow(), |e| matches!(e, Event::Submit { .. })), 0);

    let outcome = frames.render_frame(&mut scene).unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    assert_eq!(scene.resizes.len(), 1);
}

#[test]
fn slots_are_idle_before_the_first_frame() {
    let (frames, _log) = synchronizer(3, Script::default());
    assert_eq!(frames.render_ahead(), 3);
    assert_eq!(frames.in_flight(), 0);
    for i in 0..3 {
        assert_eq!(frames.slot_state(FrameSlotIndex::new(i)), Some(SlotState::Idle));
    }
    assert_eq!(frames.slot_state(FrameSlotIndex::new(3)), None);
}

#[test]
fn drop_waits_for_idle() {
    let (mut frames, log) = synchronizer(2, Script::default());
    let mut scene = RecordingScene::default();
    frames.render_frame(&mut scene).unwrap();
    drop(frames);
    assert_eq!(log.borrow().last(), Some(&Event::WaitIdle));
}
