use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinHandle;
use tutor_live_types::audio::{Modality, Voice, INPUT_MIME_TYPE};
use tutor_live_types::{Blob, LiveConfig, LiveEvent};
use tutor_live_utils::audio;
use tutor_live_utils::{AudioBackend, CaptureDevice, EndedSink, FrameSink, PlaybackDevice};

use crate::error::TutorError;
use crate::history::HistoryStore;
use crate::instruction::compose_instruction;
use crate::model::{ConversationTurn, FeedbackItem, SessionRecord, Speaker};
use crate::realtime_api::{LiveConnector, LiveSession};
use crate::reviewer::Reviewer;
use crate::session::framer::CaptureFramer;
use crate::session::playback::PlaybackQueue;
use crate::session::transcript::Transcript;
use crate::session::{
    CAPTURE_FRAME_SIZE, CAPTURE_SAMPLE_RATE, EVENT_CAPACITY, FALLBACK_SUMMARY,
    PLAYBACK_SAMPLE_RATE,
};
use crate::settings::{FeedbackLanguage, Settings};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

/// Everything the presentation layer renders from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TutorState {
    pub phase: SessionPhase,
    /// True while at least one feedback request is in flight.
    pub is_processing: bool,
    pub conversation: Vec<ConversationTurn>,
    pub latest_feedback: Option<FeedbackItem>,
    pub feedback: Vec<FeedbackItem>,
    pub combo: u32,
    pub max_combo: u32,
    pub last_error: Option<String>,
}

/// Work items for the controller's single task queue. Everything that
/// completes asynchronously is tagged with the generation of the session
/// that started it, so late completions cannot touch a newer session.
pub(crate) enum Input {
    Start {
        topic: Option<String>,
        reply: Option<oneshot::Sender<Result<(), TutorError>>>,
    },
    Stop {
        reply: Option<oneshot::Sender<Option<JoinHandle<()>>>>,
    },
    Connected {
        generation: u64,
        result: anyhow::Result<Box<dyn LiveSession>>,
    },
    Live {
        generation: u64,
        event: LiveEvent,
    },
    Captured {
        generation: u64,
        samples: Vec<f32>,
    },
    FeedbackReady {
        generation: u64,
        item: Option<FeedbackItem>,
    },
    PlaybackEnded {
        generation: u64,
        unit: u64,
    },
}

/// External collaborators the controller drives.
pub struct Collaborators {
    pub connector: Arc<dyn LiveConnector>,
    pub reviewer: Arc<dyn Reviewer>,
    pub history: Arc<dyn HistoryStore>,
    pub audio: Box<dyn AudioBackend>,
    pub settings: watch::Receiver<Settings>,
    pub voice: Voice,
}

/// Runs device work that blocks on audio threads (stream setup, joins)
/// without starving other tasks on a multi-threaded runtime.
fn off_runtime<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// Reports finished playback units back to the controller queue.
fn ended_sink(tx: mpsc::Sender<Input>, generation: u64) -> EndedSink {
    Box::new(move |unit| {
        if let Err(e) = tx.try_send(Input::PlaybackEnded { generation, unit }) {
            tracing::warn!("Failed to queue end of playback unit {}: {}", unit, e);
        }
    })
}

/// The devices and socket of one session. Only the controller holds them,
/// and `release` is the single way they are let go.
#[derive(Default)]
struct SessionResources {
    live: Option<Box<dyn LiveSession>>,
    forwarder: Option<JoinHandle<()>>,
    capture: Option<Box<dyn CaptureDevice>>,
    playback: Option<Box<dyn PlaybackDevice>>,
}

impl SessionResources {
    fn release(&mut self, queue: &mut PlaybackQueue) {
        if let Some(live) = self.live.take() {
            if let Some(stats) = live.stats() {
                tracing::info!(
                    "Session usage: total_tokens={}, input_tokens={}, output_tokens={}",
                    stats.total_tokens(),
                    stats.input_tokens(),
                    stats.output_tokens()
                );
            }
            live.close();
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        let pending = queue.interrupt();
        let capture = self.capture.take();
        let playback = self.playback.take();
        off_runtime(move || {
            if let Some(mut capture) = capture {
                capture.stop();
            }
            if let Some(mut playback) = playback {
                for unit in pending {
                    playback.stop(unit);
                }
                playback.close();
            }
        });
    }
}

pub struct SessionController {
    connector: Arc<dyn LiveConnector>,
    reviewer: Arc<dyn Reviewer>,
    history: Arc<dyn HistoryStore>,
    audio: Box<dyn AudioBackend>,
    settings: watch::Receiver<Settings>,
    voice: Voice,
    tx: mpsc::Sender<Input>,
    state: watch::Sender<TutorState>,

    phase: SessionPhase,
    generation: u64,
    language: FeedbackLanguage,
    resources: SessionResources,
    transcript: Transcript,
    framer: CaptureFramer,
    queue: PlaybackQueue,
    feedback: Vec<FeedbackItem>,
    latest_feedback: Option<FeedbackItem>,
    combo: u32,
    max_combo: u32,
    pending_feedback: usize,
    last_error: Option<String>,
}

impl SessionController {
    pub(crate) fn new(
        collaborators: Collaborators,
        tx: mpsc::Sender<Input>,
        state: watch::Sender<TutorState>,
    ) -> Self {
        Self {
            connector: collaborators.connector,
            reviewer: collaborators.reviewer,
            history: collaborators.history,
            audio: collaborators.audio,
            settings: collaborators.settings,
            voice: collaborators.voice,
            tx,
            state,
            phase: SessionPhase::Idle,
            generation: 0,
            language: FeedbackLanguage::default(),
            resources: SessionResources::default(),
            transcript: Transcript::new(),
            framer: CaptureFramer::new(CAPTURE_FRAME_SIZE),
            queue: PlaybackQueue::new(),
            feedback: Vec::new(),
            latest_feedback: None,
            combo: 0,
            max_combo: 0,
            pending_feedback: 0,
            last_error: None,
        }
    }

    /// Processes inputs in arrival order until `disposed` fires or its
    /// sender is dropped, then tears the session down.
    pub(crate) async fn run(
        mut self,
        mut rx: mpsc::Receiver<Input>,
        mut disposed: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = &mut disposed => break,
                input = rx.recv() => match input {
                    Some(input) => self.handle(input),
                    None => break,
                },
            }
        }
        self.stop();
        tracing::debug!("Session controller disposed");
    }

    pub(crate) fn handle(&mut self, input: Input) {
        match input {
            Input::Start { topic, reply } => {
                let result = self.start(topic);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Input::Stop { reply } => {
                let finalize = self.stop();
                if let Some(reply) = reply {
                    let _ = reply.send(finalize);
                }
            }
            Input::Connected { generation, result } => self.on_connected(generation, result),
            Input::Live { generation, event } => {
                if generation != self.generation {
                    tracing::trace!("Ignoring event from an ended session");
                    return;
                }
                self.on_event(event);
            }
            Input::Captured {
                generation,
                samples,
            } => {
                if generation == self.generation {
                    self.on_captured(&samples);
                }
            }
            Input::FeedbackReady { generation, item } => self.on_feedback(generation, item),
            Input::PlaybackEnded { generation, unit } => {
                if generation == self.generation {
                    self.queue.finish(unit);
                }
            }
        }
    }

    fn publish(&self) {
        self.state.send_replace(TutorState {
            phase: self.phase,
            is_processing: self.pending_feedback > 0,
            conversation: self.transcript.turns().to_vec(),
            latest_feedback: self.latest_feedback.clone(),
            feedback: self.feedback.clone(),
            combo: self.combo,
            max_combo: self.max_combo,
            last_error: self.last_error.clone(),
        });
    }

    fn start(&mut self, topic: Option<String>) -> Result<(), TutorError> {
        if self.phase != SessionPhase::Idle {
            tracing::warn!("Start requested while {:?}", self.phase);
            return Err(TutorError::AlreadyRunning);
        }
        self.generation += 1;
        let generation = self.generation;
        self.phase = SessionPhase::Starting;
        self.last_error = None;
        self.transcript.clear();
        self.feedback.clear();
        self.latest_feedback = None;
        self.publish();

        let settings = self.settings.borrow().clone();
        self.language = settings.language;
        let instruction = compose_instruction(&settings, topic.as_deref());

        let capture = match off_runtime(|| self.audio.acquire_microphone(CAPTURE_SAMPLE_RATE)) {
            Ok(capture) => capture,
            Err(e) => return Err(self.abort_start(TutorError::Acquisition(format!("{e:#}")))),
        };
        self.resources.capture = Some(capture);

        let on_ended = ended_sink(self.tx.clone(), generation);
        match off_runtime(|| self.audio.open_playback(PLAYBACK_SAMPLE_RATE, on_ended)) {
            Ok(playback) => self.resources.playback = Some(playback),
            Err(e) => return Err(self.abort_start(TutorError::Acquisition(format!("{e:#}")))),
        }

        let (events_tx, mut events_rx) = mpsc::channel::<LiveEvent>(EVENT_CAPACITY);
        let forward_tx = self.tx.clone();
        self.resources.forwarder = Some(tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if forward_tx.send(Input::Live { generation, event }).await.is_err() {
                    break;
                }
            }
        }));

        let config = LiveConfig::new()
            .with_system_instruction(instruction)
            .with_response_modality(Modality::Audio)
            .with_voice(self.voice.clone())
            .with_input_transcription(true)
            .with_output_transcription(true);
        let connector = self.connector.clone();
        let connect_tx = self.tx.clone();
        tokio::spawn(async move {
            let result = connector.open(config, events_tx).await;
            let _ = connect_tx.send(Input::Connected { generation, result }).await;
        });

        tracing::info!("Session {} starting", generation);
        Ok(())
    }

    fn abort_start(&mut self, error: TutorError) -> TutorError {
        tracing::error!("Failed to start session: {}", error);
        self.resources.release(&mut self.queue);
        self.generation += 1;
        self.phase = SessionPhase::Idle;
        self.last_error = Some(error.to_string());
        self.publish();
        error
    }

    fn on_connected(&mut self, generation: u64, result: anyhow::Result<Box<dyn LiveSession>>) {
        if generation != self.generation || self.phase == SessionPhase::Idle {
            if let Ok(live) = result {
                tracing::debug!("Closing a session that opened after stop");
                live.close();
            }
            return;
        }
        match result {
            Ok(live) => {
                tracing::debug!("Session {} handle ready", generation);
                self.resources.live = Some(live);
            }
            Err(e) => {
                let error = TutorError::Transport(format!("{e:#}"));
                tracing::error!("{}", error);
                self.last_error = Some(error.to_string());
                self.stop();
            }
        }
    }

    fn on_event(&mut self, event: LiveEvent) {
        match event {
            LiveEvent::Open => self.activate(),
            LiveEvent::Error(detail) => {
                let error = TutorError::Transport(detail);
                tracing::error!("{}", error);
                self.last_error = Some(error.to_string());
                self.stop();
            }
            LiveEvent::Closed(reason) => {
                tracing::info!("{}", TutorError::TransportClosed(reason));
                self.stop();
            }
            _ if self.phase != SessionPhase::Active => {
                tracing::debug!("Dropping content event received while {:?}", self.phase);
            }
            LiveEvent::OutputTranscription(text) => {
                self.transcript.push_fragment(Speaker::Tutor, &text);
                self.publish();
            }
            LiveEvent::InputTranscription(text) => {
                self.transcript.push_fragment(Speaker::User, &text);
                self.publish();
            }
            LiveEvent::TurnComplete => self.complete_turn(),
            LiveEvent::ModelAudio(data) => self.play(&data),
            LiveEvent::Interrupted => self.interrupt(),
        }
    }

    fn activate(&mut self) {
        if self.phase != SessionPhase::Starting {
            return;
        }
        self.phase = SessionPhase::Active;
        self.combo = 0;
        self.max_combo = 0;
        self.pending_feedback = 0;
        self.transcript.clear();
        self.feedback.clear();
        self.latest_feedback = None;
        self.framer.clear();

        let generation = self.generation;
        let capture_tx = self.tx.clone();
        let sink: FrameSink = Box::new(move |samples| {
            if let Err(e) = capture_tx.try_send(Input::Captured {
                generation,
                samples,
            }) {
                tracing::warn!("Failed to queue captured audio: {}", e);
            }
        });
        let started = match self.resources.capture.as_mut() {
            Some(capture) => off_runtime(|| capture.start(sink)),
            None => Err(anyhow::anyhow!("microphone was released")),
        };
        if let Err(e) = started {
            let error = TutorError::Acquisition(format!("{e:#}"));
            tracing::error!("{}", error);
            self.last_error = Some(error.to_string());
            self.stop();
            return;
        }

        tracing::info!("Session {} active", generation);
        self.publish();
    }

    fn on_captured(&mut self, samples: &[f32]) {
        if self.phase != SessionPhase::Active {
            return;
        }
        for frame in self.framer.push(samples) {
            let blob = Blob::new(INPUT_MIME_TYPE, audio::encode(&frame));
            match self.resources.live.as_ref() {
                Some(live) => live.send_audio_frame(blob),
                None => tracing::trace!("Session handle not ready, dropping frame"),
            }
        }
    }

    fn complete_turn(&mut self) {
        let user_text = self.transcript.complete_turn();
        if user_text.is_empty() {
            return;
        }
        self.combo += 1;
        self.max_combo = self.max_combo.max(self.combo);
        self.pending_feedback += 1;
        self.publish();

        let generation = self.generation;
        let language = self.language;
        let reviewer = self.reviewer.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let item = match reviewer.feedback_for(&user_text, language).await {
                Ok(feedback) => Some(FeedbackItem::stamp(feedback)),
                Err(e) => {
                    tracing::warn!("{}", TutorError::FeedbackRequest(format!("{e:#}")));
                    None
                }
            };
            let _ = tx.send(Input::FeedbackReady { generation, item }).await;
        });
    }

    fn on_feedback(&mut self, generation: u64, item: Option<FeedbackItem>) {
        if generation != self.generation {
            // The session is gone; the learner still gets the item in the global log.
            if let Some(item) = item {
                tracing::debug!("Feedback arrived after its session ended");
                self.history.append_feedback(item);
            }
            return;
        }
        self.pending_feedback = self.pending_feedback.saturating_sub(1);
        if let Some(item) = item {
            self.history.append_feedback(item.clone());
            self.feedback.push(item.clone());
            self.latest_feedback = Some(item);
        }
        self.publish();
    }

    fn play(&mut self, data: &str) {
        let buffer = match audio::decode(data, PLAYBACK_SAMPLE_RATE, 1) {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!("Dropping audio fragment: {}", TutorError::from(e));
                return;
            }
        };
        if buffer.frame_count() == 0 {
            return;
        }
        let Some(playback) = self.resources.playback.as_mut() else {
            return;
        };
        let unit = self.queue.schedule(playback.current_time(), buffer.duration());
        if let Err(e) = playback.start(unit.id, &buffer, unit.start) {
            tracing::warn!("Failed to schedule playback: {:#}", e);
            self.queue.finish(unit.id);
        }
    }

    fn interrupt(&mut self) {
        let stopped = self.queue.interrupt();
        if let Some(playback) = self.resources.playback.as_mut() {
            for unit in &stopped {
                playback.stop(*unit);
            }
        }
        tracing::debug!("Interrupted, stopped {} playback units", stopped.len());
    }

    /// Tears the session down. Visible state resets first, then every
    /// resource is released; the record is written by a detached task whose
    /// handle is returned. Does nothing when no session is running.
    pub(crate) fn stop(&mut self) -> Option<JoinHandle<()>> {
        if self.phase == SessionPhase::Idle {
            tracing::debug!("Stop ignored, no session running");
            return None;
        }
        let ended_at = Local::now();
        self.phase = SessionPhase::Stopping;
        let conversation = self.transcript.take();
        let feedback = std::mem::take(&mut self.feedback);
        let max_combo = self.max_combo;

        self.latest_feedback = None;
        self.combo = 0;
        self.max_combo = 0;
        self.pending_feedback = 0;
        self.framer.clear();
        self.generation += 1;
        self.publish();

        self.resources.release(&mut self.queue);
        self.phase = SessionPhase::Idle;
        self.publish();
        tracing::info!("Session stopped with {} turns", conversation.len());

        if conversation.is_empty() {
            return None;
        }
        Some(tokio::spawn(finalize(
            self.reviewer.clone(),
            self.history.clone(),
            ended_at,
            conversation,
            feedback,
            max_combo,
        )))
    }
}

async fn finalize(
    reviewer: Arc<dyn Reviewer>,
    history: Arc<dyn HistoryStore>,
    ended_at: DateTime<Local>,
    conversation: Vec<ConversationTurn>,
    feedback: Vec<FeedbackItem>,
    max_combo: u32,
) {
    let summary = match reviewer.summarize(&conversation).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::warn!("{}", TutorError::SummaryRequest(format!("{e:#}")));
            FALLBACK_SUMMARY.to_string()
        }
    };
    let record = SessionRecord::new(ended_at, summary, max_combo, conversation, feedback);
    tracing::info!(
        "Saving session record {} ({} turns, max combo {})",
        record.id,
        record.conversation.len(),
        record.max_combo
    );
    history.save_session(record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use tutor_live_utils::AudioBuffer;

    use crate::history::InMemoryHistory;
    use crate::model::Feedback;
    use crate::reviewer::MockReviewer;

    #[derive(Default)]
    struct Recorder {
        configs: Mutex<Vec<LiveConfig>>,
        events: Mutex<Option<mpsc::Sender<LiveEvent>>>,
        frames: Mutex<Vec<Blob>>,
        closes: AtomicUsize,
        fail_microphone: AtomicBool,
        sink: Mutex<Option<FrameSink>>,
        captures_stopped: AtomicUsize,
        clock: Mutex<f64>,
        started_units: Mutex<Vec<(u64, f64)>>,
        stopped_units: Mutex<Vec<u64>>,
        playbacks_closed: AtomicUsize,
    }

    impl Recorder {
        fn capture(&self, samples: Vec<f32>) {
            let mut sink = self.sink.lock().unwrap();
            (sink.as_mut().expect("capture not started"))(samples);
        }
    }

    struct FakeSession(Arc<Recorder>);

    impl LiveSession for FakeSession {
        fn send_audio_frame(&self, frame: Blob) {
            self.0.frames.lock().unwrap().push(frame);
        }

        fn close(&self) {
            self.0.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeConnector(Arc<Recorder>);

    #[async_trait]
    impl LiveConnector for FakeConnector {
        async fn open(
            &self,
            config: LiveConfig,
            events: mpsc::Sender<LiveEvent>,
        ) -> anyhow::Result<Box<dyn LiveSession>> {
            self.0.configs.lock().unwrap().push(config);
            *self.0.events.lock().unwrap() = Some(events);
            Ok(Box::new(FakeSession(self.0.clone())))
        }
    }

    struct FakeCapture(Arc<Recorder>);

    impl CaptureDevice for FakeCapture {
        fn start(&mut self, sink: FrameSink) -> anyhow::Result<()> {
            *self.0.sink.lock().unwrap() = Some(sink);
            Ok(())
        }

        fn stop(&mut self) {
            self.0.captures_stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakePlayback(Arc<Recorder>);

    impl PlaybackDevice for FakePlayback {
        fn current_time(&self) -> f64 {
            *self.0.clock.lock().unwrap()
        }

        fn start(&mut self, unit: u64, _buffer: &AudioBuffer, at: f64) -> anyhow::Result<()> {
            self.0.started_units.lock().unwrap().push((unit, at));
            Ok(())
        }

        fn stop(&mut self, unit: u64) {
            self.0.stopped_units.lock().unwrap().push(unit);
        }

        fn close(&mut self) {
            self.0.playbacks_closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeAudio(Arc<Recorder>);

    impl AudioBackend for FakeAudio {
        fn acquire_microphone(&mut self, sample_rate: u32) -> anyhow::Result<Box<dyn CaptureDevice>> {
            assert_eq!(sample_rate, CAPTURE_SAMPLE_RATE);
            if self.0.fail_microphone.load(Ordering::SeqCst) {
                anyhow::bail!("permission denied");
            }
            Ok(Box::new(FakeCapture(self.0.clone())))
        }

        fn open_playback(
            &mut self,
            sample_rate: u32,
            _on_ended: EndedSink,
        ) -> anyhow::Result<Box<dyn PlaybackDevice>> {
            assert_eq!(sample_rate, PLAYBACK_SAMPLE_RATE);
            Ok(Box::new(FakePlayback(self.0.clone())))
        }
    }

    struct Harness {
        controller: SessionController,
        rx: mpsc::Receiver<Input>,
        state: watch::Receiver<TutorState>,
        recorder: Arc<Recorder>,
        history: Arc<InMemoryHistory>,
    }

    fn collaborators(
        recorder: &Arc<Recorder>,
        reviewer: MockReviewer,
        history: Arc<InMemoryHistory>,
    ) -> Collaborators {
        let (_settings_tx, settings) = watch::channel(Settings::default());
        Collaborators {
            connector: Arc::new(FakeConnector(recorder.clone())),
            reviewer: Arc::new(reviewer),
            history,
            audio: Box::new(FakeAudio(recorder.clone())),
            settings,
            voice: Voice::Puck,
        }
    }

    fn harness(reviewer: MockReviewer) -> Harness {
        let recorder = Arc::new(Recorder::default());
        let history = Arc::new(InMemoryHistory::new());
        let (tx, rx) = mpsc::channel(64);
        let (state_tx, state) = watch::channel(TutorState::default());
        let controller = SessionController::new(
            collaborators(&recorder, reviewer, history.clone()),
            tx,
            state_tx,
        );
        Harness {
            controller,
            rx,
            state,
            recorder,
            history,
        }
    }

    impl Harness {
        async fn next_input(&mut self) -> Input {
            tokio::time::timeout(Duration::from_secs(1), self.rx.recv())
                .await
                .expect("timed out waiting for input")
                .expect("input channel closed")
        }

        /// Handles the next queued input.
        async fn pump(&mut self) {
            let input = self.next_input().await;
            self.controller.handle(input);
        }

        fn event(&mut self, event: LiveEvent) {
            let generation = self.controller.generation;
            self.controller.handle(Input::Live { generation, event });
        }

        /// Starts a session and drives it to `Active` with the handle attached.
        async fn open(&mut self) {
            self.controller.start(None).unwrap();
            self.pump().await;
            self.event(LiveEvent::Open);
            assert_eq!(self.controller.phase, SessionPhase::Active);
        }

        fn state(&self) -> TutorState {
            self.state.borrow().clone()
        }
    }

    fn quiet_reviewer() -> MockReviewer {
        let mut reviewer = MockReviewer::new();
        reviewer.expect_feedback_for().never();
        reviewer.expect_summarize().never();
        reviewer
    }

    fn echoing_reviewer(feedback_calls: usize) -> MockReviewer {
        let mut reviewer = MockReviewer::new();
        reviewer
            .expect_feedback_for()
            .times(feedback_calls)
            .returning(|text, _| {
                Ok(Feedback {
                    original_text: text.to_string(),
                    corrected_text: text.to_string(),
                    comments: vec![],
                })
            });
        reviewer
            .expect_summarize()
            .times(1)
            .returning(|_| Ok("Talked about tea.".into()));
        reviewer
    }

    /// The event sender the controller handed to the connector.
    async fn live_events(recorder: &Recorder) -> mpsc::Sender<LiveEvent> {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Some(events) = recorder.events.lock().unwrap().clone() {
                    return events;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("connector was never opened")
    }

    async fn wait_until(
        state: &mut watch::Receiver<TutorState>,
        ready: impl FnMut(&TutorState) -> bool,
    ) {
        tokio::time::timeout(Duration::from_secs(1), state.wait_for(ready))
            .await
            .expect("timed out waiting for state")
            .map(|_| ())
            .expect("controller stopped publishing");
    }

    async fn saved_sessions(history: &InMemoryHistory) -> Vec<SessionRecord> {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let sessions = history.sessions();
                if !sessions.is_empty() {
                    return sessions;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("no session record was saved")
    }

    fn fragment(seconds: f64) -> String {
        let samples = (seconds * PLAYBACK_SAMPLE_RATE as f64).round() as usize;
        audio::encode(&vec![0.25; samples])
    }

    #[tokio::test]
    async fn open_wires_the_configured_session() {
        let mut h = harness(quiet_reviewer());
        h.controller.start(Some("ordering coffee".into())).unwrap();
        assert_eq!(h.state().phase, SessionPhase::Starting);
        h.pump().await;
        h.event(LiveEvent::Open);

        assert_eq!(h.state().phase, SessionPhase::Active);
        let configs = h.recorder.configs.lock().unwrap();
        assert_eq!(configs.len(), 1);
        assert!(configs[0].system_instruction().contains("ordering coffee"));
        assert_eq!(configs[0].voice(), &Voice::Puck);
        assert_eq!(configs[0].response_modality(), Modality::Audio);
        assert!(configs[0].input_transcription());
        assert!(h.recorder.sink.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let mut h = harness(quiet_reviewer());
        h.open().await;
        assert!(matches!(
            h.controller.start(None),
            Err(TutorError::AlreadyRunning)
        ));
        assert_eq!(h.controller.phase, SessionPhase::Active);
    }

    #[tokio::test]
    async fn microphone_failure_leaves_the_controller_idle() {
        let mut h = harness(quiet_reviewer());
        h.recorder.fail_microphone.store(true, Ordering::SeqCst);

        let result = h.controller.start(None);

        assert!(matches!(result, Err(TutorError::Acquisition(_))));
        let state = h.state();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert!(state.last_error.unwrap().contains("permission denied"));
        assert_eq!(h.recorder.playbacks_closed.load(Ordering::SeqCst), 0);
        assert!(h.rx.try_recv().is_err());

        h.recorder.fail_microphone.store(false, Ordering::SeqCst);
        h.open().await;
    }

    #[tokio::test]
    async fn fragments_assemble_into_alternating_turns() {
        let mut reviewer = MockReviewer::new();
        reviewer
            .expect_feedback_for()
            .withf(|text, _| text.trim() == "I like tea.")
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("offline")));
        let mut h = harness(reviewer);
        h.open().await;

        h.event(LiveEvent::OutputTranscription("Hi, what".into()));
        h.event(LiveEvent::OutputTranscription(" do you like?".into()));
        h.event(LiveEvent::InputTranscription("I like".into()));
        h.event(LiveEvent::InputTranscription(" tea.".into()));
        h.event(LiveEvent::TurnComplete);

        let state = h.state();
        let turns: Vec<_> = state
            .conversation
            .iter()
            .map(|t| (t.speaker, t.text.as_str()))
            .collect();
        assert_eq!(
            turns,
            vec![
                (Speaker::Tutor, "Hi, what do you like?"),
                (Speaker::User, "I like tea."),
            ]
        );
        assert_eq!(state.combo, 1);
        assert!(state.is_processing);

        h.pump().await;
        let state = h.state();
        assert!(!state.is_processing);
        assert!(state.latest_feedback.is_none());
        assert_eq!(state.combo, 1);
    }

    #[tokio::test]
    async fn turn_without_user_speech_requests_no_feedback() {
        let mut h = harness(quiet_reviewer());
        h.open().await;

        h.event(LiveEvent::OutputTranscription("Tell me about your day.".into()));
        h.event(LiveEvent::TurnComplete);

        let state = h.state();
        assert_eq!(state.combo, 0);
        assert!(!state.is_processing);
    }

    #[tokio::test]
    async fn feedback_lands_in_session_and_history() {
        let mut reviewer = MockReviewer::new();
        reviewer.expect_feedback_for().times(1).returning(|text, _| {
            Ok(Feedback {
                original_text: text.to_string(),
                corrected_text: "I went home.".into(),
                comments: vec!["'go' is irregular.".into()],
            })
        });
        let mut h = harness(reviewer);
        h.open().await;

        h.event(LiveEvent::InputTranscription("I goed home.".into()));
        h.event(LiveEvent::TurnComplete);
        h.pump().await;

        let state = h.state();
        let latest = state.latest_feedback.expect("feedback should be shown");
        assert_eq!(latest.original_text, "I goed home.");
        assert_eq!(state.feedback, vec![latest.clone()]);
        assert_eq!(h.history.feedback(), vec![latest]);
    }

    #[tokio::test]
    async fn frames_wait_for_the_session_handle() {
        let mut h = harness(quiet_reviewer());
        h.controller.start(None).unwrap();
        // Setup acknowledged before the connector has returned the handle.
        let connected = h.next_input().await;
        h.event(LiveEvent::Open);

        h.recorder.capture(vec![0.1; CAPTURE_FRAME_SIZE]);
        h.pump().await;
        assert!(h.recorder.frames.lock().unwrap().is_empty());

        h.controller.handle(connected);
        h.recorder.capture(vec![0.1; CAPTURE_FRAME_SIZE + 100]);
        h.pump().await;

        let frames = h.recorder.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].mime_type(), INPUT_MIME_TYPE);
        let decoded = audio::decode(frames[0].data(), CAPTURE_SAMPLE_RATE, 1).unwrap();
        assert_eq!(decoded.frame_count(), CAPTURE_FRAME_SIZE);
    }

    #[tokio::test]
    async fn audio_is_chained_without_gaps() {
        let mut h = harness(quiet_reviewer());
        h.open().await;

        h.event(LiveEvent::ModelAudio(fragment(0.1)));
        h.event(LiveEvent::ModelAudio(fragment(0.2)));
        h.event(LiveEvent::ModelAudio("not base64!".into()));
        *h.recorder.clock.lock().unwrap() = 5.0;
        h.event(LiveEvent::ModelAudio(fragment(0.1)));

        let started = h.recorder.started_units.lock().unwrap().clone();
        assert_eq!(started.len(), 3);
        assert_eq!(started[0], (1, 0.0));
        assert_eq!(started[1].0, 2);
        assert!((started[1].1 - 0.1).abs() < 1e-9);
        assert_eq!(started[2], (3, 5.0));
        assert_eq!(h.controller.phase, SessionPhase::Active);
    }

    #[tokio::test]
    async fn interruption_stops_everything_queued() {
        let mut h = harness(quiet_reviewer());
        h.open().await;
        h.event(LiveEvent::ModelAudio(fragment(0.5)));
        h.event(LiveEvent::ModelAudio(fragment(0.5)));
        h.event(LiveEvent::ModelAudio(fragment(0.5)));
        h.controller.handle(Input::PlaybackEnded {
            generation: h.controller.generation,
            unit: 1,
        });

        h.event(LiveEvent::Interrupted);

        assert_eq!(*h.recorder.stopped_units.lock().unwrap(), vec![2, 3]);
        assert_eq!(h.controller.queue.in_flight(), 0);
        assert_eq!(h.controller.queue.next_start(), 0.0);
        assert_eq!(h.controller.phase, SessionPhase::Active);
    }

    #[tokio::test]
    async fn stop_without_conversation_saves_nothing() {
        let mut h = harness(quiet_reviewer());
        h.open().await;
        h.event(LiveEvent::ModelAudio(fragment(0.5)));

        assert!(h.controller.stop().is_none());
        assert!(h.controller.stop().is_none());

        assert_eq!(h.state().phase, SessionPhase::Idle);
        assert_eq!(h.recorder.closes.load(Ordering::SeqCst), 1);
        assert_eq!(h.recorder.captures_stopped.load(Ordering::SeqCst), 1);
        assert_eq!(h.recorder.playbacks_closed.load(Ordering::SeqCst), 1);
        assert_eq!(*h.recorder.stopped_units.lock().unwrap(), vec![1]);
        assert!(h.history.sessions().is_empty());
    }

    #[tokio::test]
    async fn stop_persists_one_record() {
        let mut reviewer = MockReviewer::new();
        reviewer
            .expect_feedback_for()
            .times(2)
            .returning(|text, _| {
                Ok(Feedback {
                    original_text: text.to_string(),
                    corrected_text: text.to_string(),
                    comments: vec![],
                })
            });
        reviewer
            .expect_summarize()
            .times(1)
            .returning(|turns| Ok(format!("Talked over {} turns.", turns.len())));
        let mut h = harness(reviewer);
        h.open().await;

        for answer in ["I like tea.", "Green tea."] {
            h.event(LiveEvent::OutputTranscription("Why?".into()));
            h.event(LiveEvent::InputTranscription(answer.into()));
            h.event(LiveEvent::TurnComplete);
            h.pump().await;
        }
        assert_eq!(h.state().max_combo, 2);

        let finalize = h.controller.stop().expect("conversation should be saved");
        let state = h.state();
        assert!(state.conversation.is_empty());
        assert!(state.feedback.is_empty());
        assert_eq!(state.combo, 0);
        finalize.await.unwrap();

        let sessions = h.history.sessions();
        assert_eq!(sessions.len(), 1);
        let record = &sessions[0];
        assert_eq!(record.summary, "Talked over 4 turns.");
        assert_eq!(record.max_combo, 2);
        assert_eq!(record.conversation.len(), 4);
        assert_eq!(record.feedback.len(), 2);
        let ended_at = Local.timestamp_millis_opt(record.id).unwrap();
        assert_eq!(record.date, ended_at.date_naive());
    }

    #[tokio::test]
    async fn failed_summary_falls_back() {
        let mut reviewer = MockReviewer::new();
        reviewer.expect_feedback_for().never();
        reviewer
            .expect_summarize()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("quota exceeded")));
        let mut h = harness(reviewer);
        h.open().await;
        h.event(LiveEvent::OutputTranscription("Hello!".into()));

        h.controller.stop().unwrap().await.unwrap();

        let sessions = h.history.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].summary, FALLBACK_SUMMARY);
        assert_eq!(sessions[0].max_combo, 0);
    }

    #[tokio::test]
    async fn late_feedback_only_reaches_the_global_log() {
        let mut reviewer = MockReviewer::new();
        reviewer.expect_feedback_for().times(1).returning(|text, _| {
            Ok(Feedback {
                original_text: text.to_string(),
                corrected_text: "Me too.".into(),
                comments: vec![],
            })
        });
        reviewer
            .expect_summarize()
            .returning(|_| Ok("Short chat.".into()));
        let mut h = harness(reviewer);
        h.open().await;
        h.event(LiveEvent::InputTranscription("Me also.".into()));
        h.event(LiveEvent::TurnComplete);

        let finalize = h.controller.stop().unwrap();
        h.pump().await;
        finalize.await.unwrap();

        let state = h.state();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert!(state.latest_feedback.is_none());
        assert!(!state.is_processing);
        assert_eq!(h.history.feedback().len(), 1);
        assert!(h.history.sessions()[0].feedback.is_empty());
    }

    #[tokio::test]
    async fn transport_error_tears_down() {
        let mut h = harness(quiet_reviewer());
        h.open().await;
        let old_generation = h.controller.generation;

        h.event(LiveEvent::Error("socket reset".into()));

        let state = h.state();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert!(state.last_error.unwrap().contains("socket reset"));
        assert_eq!(h.recorder.closes.load(Ordering::SeqCst), 1);
        assert_eq!(h.recorder.captures_stopped.load(Ordering::SeqCst), 1);

        h.controller.handle(Input::Live {
            generation: old_generation,
            event: LiveEvent::OutputTranscription("ghost".into()),
        });
        assert!(h.state().conversation.is_empty());
        assert!(h.controller.stop().is_none());
    }

    #[tokio::test]
    async fn handle_opened_after_stop_is_closed() {
        let mut h = harness(quiet_reviewer());
        h.controller.start(None).unwrap();
        let connected = h.next_input().await;

        assert!(h.controller.stop().is_none());
        h.controller.handle(connected);

        assert_eq!(h.recorder.closes.load(Ordering::SeqCst), 1);
        assert!(h.controller.resources.live.is_none());
        assert_eq!(h.controller.phase, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn disposing_the_handle_tears_the_session_down() {
        let recorder = Arc::new(Recorder::default());
        let history = Arc::new(InMemoryHistory::new());
        let handle = crate::session::SessionHandle::spawn(collaborators(
            &recorder,
            quiet_reviewer(),
            history.clone(),
        ));

        handle.start(None).await.unwrap();
        assert!(matches!(
            handle.start(None).await,
            Err(TutorError::AlreadyRunning)
        ));
        handle.shutdown().await;

        assert_eq!(recorder.captures_stopped.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.playbacks_closed.load(Ordering::SeqCst), 1);
        assert!(history.sessions().is_empty());
    }

    #[tokio::test]
    async fn repeated_stop_and_disposal_save_one_record() {
        let recorder = Arc::new(Recorder::default());
        let history = Arc::new(InMemoryHistory::new());
        let handle = crate::session::SessionHandle::spawn(collaborators(
            &recorder,
            echoing_reviewer(2),
            history.clone(),
        ));
        let mut state = handle.subscribe();

        handle.start(None).await.unwrap();
        let events = live_events(&recorder).await;
        events.send(LiveEvent::Open).await.unwrap();
        for answer in ["I like tea.", "Green tea."] {
            events
                .send(LiveEvent::OutputTranscription("Why?".into()))
                .await
                .unwrap();
            events
                .send(LiveEvent::InputTranscription(answer.into()))
                .await
                .unwrap();
            events.send(LiveEvent::TurnComplete).await.unwrap();
        }
        wait_until(&mut state, |s| s.max_combo == 2 && !s.is_processing).await;

        let finalize = handle
            .stop()
            .await
            .unwrap()
            .expect("conversation should be saved");
        assert!(handle.stop().await.unwrap().is_none());
        let _ = events.send(LiveEvent::Closed(None)).await;
        handle.shutdown().await;
        finalize.await.unwrap();

        let sessions = history.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].max_combo, 2);
        assert_eq!(sessions[0].conversation.len(), 4);
        assert_eq!(sessions[0].feedback.len(), 2);
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.captures_stopped.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.playbacks_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disposing_an_active_session_saves_it_once() {
        let recorder = Arc::new(Recorder::default());
        let history = Arc::new(InMemoryHistory::new());
        let handle = crate::session::SessionHandle::spawn(collaborators(
            &recorder,
            echoing_reviewer(1),
            history.clone(),
        ));
        let mut state = handle.subscribe();

        handle.start(None).await.unwrap();
        let events = live_events(&recorder).await;
        events.send(LiveEvent::Open).await.unwrap();
        events
            .send(LiveEvent::OutputTranscription("Hello!".into()))
            .await
            .unwrap();
        events
            .send(LiveEvent::InputTranscription("Hi.".into()))
            .await
            .unwrap();
        events.send(LiveEvent::TurnComplete).await.unwrap();
        wait_until(&mut state, |s| {
            s.phase == SessionPhase::Active && s.combo == 1 && !s.is_processing
        })
        .await;

        handle.shutdown().await;

        let sessions = saved_sessions(&history).await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].max_combo, 1);
        assert_eq!(sessions[0].conversation.len(), 2);
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.captures_stopped.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.playbacks_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn device_work_is_safe_on_a_multi_threaded_runtime() {
        let recorder = Arc::new(Recorder::default());
        let history = Arc::new(InMemoryHistory::new());
        let handle = crate::session::SessionHandle::spawn(collaborators(
            &recorder,
            quiet_reviewer(),
            history.clone(),
        ));
        let mut state = handle.subscribe();

        handle.start(None).await.unwrap();
        let events = live_events(&recorder).await;
        events.send(LiveEvent::Open).await.unwrap();
        wait_until(&mut state, |s| s.phase == SessionPhase::Active).await;
        assert!(recorder.sink.lock().unwrap().is_some());

        assert!(handle.stop().await.unwrap().is_none());
        assert_eq!(handle.state().phase, SessionPhase::Idle);
        handle.shutdown().await;

        assert_eq!(recorder.captures_stopped.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.playbacks_closed.load(Ordering::SeqCst), 1);
        assert!(history.sessions().is_empty());
    }

    #[test]
    fn playback_end_is_queued_or_dropped() {
        let (tx, mut rx) = mpsc::channel(1);
        let on_ended = ended_sink(tx, 7);

        on_ended(3);
        // Queue is full; the second report is dropped without panicking.
        on_ended(4);

        assert!(matches!(
            rx.try_recv(),
            Ok(Input::PlaybackEnded {
                generation: 7,
                unit: 3
            })
        ));
        assert!(rx.try_recv().is_err());
        drop(rx);
        on_ended(5);
    }
}
