//! Listening state machine against a scripted recognizer.

use async_trait::async_trait;
use navia_core::{
    NaviaError, NaviaResult, RecognitionError, RecognitionEvent, SpeechRecognizer, VoiceConfig,
};
use navia_voice::{
    BridgeCommand, BridgeRecognizer, ListenOutcome, ListenState, VoiceError, VoiceListener,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Each `start_listening` replays the next scripted session; an exhausted script
/// leaves the session open forever.
struct ScriptedRecognizer {
    sessions: Mutex<VecDeque<Vec<RecognitionEvent>>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    open: Mutex<Vec<mpsc::Sender<RecognitionEvent>>>,
}

impl ScriptedRecognizer {
    fn new(sessions: Vec<Vec<RecognitionEvent>>) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(sessions.into()),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            open: Mutex::new(Vec::new()),
        })
    }

    fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn start_listening(&self) -> NaviaResult<mpsc::Receiver<RecognitionEvent>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(8);
        match self.sessions.lock().unwrap().pop_front() {
            Some(events) => {
                for event in events {
                    tx.try_send(event).unwrap();
                }
            }
            None => self.open.lock().unwrap().push(tx),
        }
        Ok(rx)
    }

    async fn stop_listening(&self) -> NaviaResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn initializing() -> Vec<RecognitionEvent> {
    vec![RecognitionEvent::Error(RecognitionError::Initializing)]
}

fn heard(text: &str) -> Vec<RecognitionEvent> {
    vec![
        RecognitionEvent::Started,
        RecognitionEvent::Result(text.to_string()),
        RecognitionEvent::Ended,
    ]
}

#[tokio::test(start_paused = true)]
async fn initializing_is_retried_with_linear_backoff() {
    let recognizer = ScriptedRecognizer::new(vec![
        initializing(),
        initializing(),
        heard("where am I"),
    ]);
    let listener = VoiceListener::new(recognizer.clone(), VoiceConfig::default());

    let started = tokio::time::Instant::now();
    let outcome = tokio_test::assert_ok!(listener.listen_once().await);
    assert_eq!(outcome, ListenOutcome::Heard("where am I".into()));
    // 1500 ms after the first failure, 3000 ms after the second
    assert_eq!(started.elapsed(), Duration::from_millis(4500));
    assert_eq!(recognizer.starts(), 3);
    assert_eq!(listener.state(), ListenState::Processing);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_configured_retries() {
    let recognizer = ScriptedRecognizer::new(vec![initializing(); 5]);
    let listener = VoiceListener::new(recognizer.clone(), VoiceConfig::default());

    let started = tokio::time::Instant::now();
    let err = tokio_test::assert_err!(listener.listen_once().await);
    assert!(matches!(err, VoiceError::RetriesExhausted(3)));
    assert_eq!(started.elapsed(), Duration::from_millis(1500 + 3000 + 4500));
    assert_eq!(recognizer.starts(), 4);
    assert_eq!(listener.state(), ListenState::Idle);
}

#[tokio::test(start_paused = true)]
async fn no_speech_is_silence_not_failure() {
    let recognizer = ScriptedRecognizer::new(vec![vec![
        RecognitionEvent::Started,
        RecognitionEvent::Error(RecognitionError::NoSpeech),
    ]]);
    let listener = VoiceListener::new(recognizer.clone(), VoiceConfig::default());
    assert_eq!(
        tokio_test::assert_ok!(listener.listen_once().await),
        ListenOutcome::Silence
    );
    assert_eq!(recognizer.starts(), 1);
    assert_eq!(listener.state(), ListenState::Idle);
}

#[tokio::test(start_paused = true)]
async fn other_errors_are_returned_at_once() {
    let recognizer = ScriptedRecognizer::new(vec![vec![RecognitionEvent::Error(
        RecognitionError::Other("network".into()),
    )]]);
    let listener = VoiceListener::new(recognizer.clone(), VoiceConfig::default());
    let err = tokio_test::assert_err!(listener.listen_once().await);
    assert!(matches!(err, VoiceError::Recognition(RecognitionError::Other(ref m)) if m == "network"));
    assert_eq!(recognizer.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_during_backoff_prevents_another_session() {
    let recognizer = ScriptedRecognizer::new(vec![initializing(), heard("too late")]);
    let listener = Arc::new(VoiceListener::new(recognizer.clone(), VoiceConfig::default()));

    let pending = tokio::spawn({
        let listener = listener.clone();
        async move { listener.listen_once().await }
    });
    tokio::time::sleep(Duration::from_millis(500)).await;
    listener.stop().await;

    let outcome = tokio_test::assert_ok!(pending.await.unwrap());
    assert_eq!(outcome, ListenOutcome::Stopped);
    assert_eq!(recognizer.starts(), 1);
    assert_eq!(listener.state(), ListenState::Stopped);

    // a stopped listener stays stopped
    assert_eq!(
        tokio_test::assert_ok!(listener.listen_once().await),
        ListenOutcome::Stopped
    );
    assert_eq!(recognizer.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_while_listening_ends_the_session() {
    let recognizer = ScriptedRecognizer::new(vec![]);
    let listener = Arc::new(VoiceListener::new(recognizer.clone(), VoiceConfig::default()));

    let pending = tokio::spawn({
        let listener = listener.clone();
        async move { listener.listen_once().await }
    });
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(listener.state(), ListenState::Listening);
    listener.stop().await;

    assert_eq!(
        tokio_test::assert_ok!(pending.await.unwrap()),
        ListenOutcome::Stopped
    );
    assert_eq!(recognizer.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn run_hands_each_utterance_over_then_listens_again() {
    let recognizer = ScriptedRecognizer::new(vec![
        heard("check surroundings"),
        vec![RecognitionEvent::Ended],
        heard("stop"),
    ]);
    let listener = Arc::new(VoiceListener::new(recognizer.clone(), VoiceConfig::default()));
    let heard_so_far = Arc::new(Mutex::new(Vec::new()));

    let result = listener
        .run(|text| {
            let heard_so_far = heard_so_far.clone();
            let listener = listener.clone();
            async move {
                let done = text == "stop";
                heard_so_far.lock().unwrap().push(text);
                if done {
                    listener.stop().await;
                }
            }
        })
        .await;

    tokio_test::assert_ok!(result);
    assert_eq!(
        *heard_so_far.lock().unwrap(),
        vec!["check surroundings".to_string(), "stop".to_string()]
    );
    assert_eq!(recognizer.starts(), 3);
}

#[tokio::test(start_paused = true)]
async fn bridge_without_host_exhausts_retries() {
    let bridge = Arc::new(BridgeRecognizer::new());
    let listener = VoiceListener::new(bridge, VoiceConfig::default());
    let err = tokio_test::assert_err!(listener.listen_once().await);
    assert!(matches!(err, VoiceError::RetriesExhausted(3)));
}

#[tokio::test(start_paused = true)]
async fn bridge_host_registered_late_is_picked_up_on_retry() {
    let bridge = Arc::new(BridgeRecognizer::new());
    let listener = VoiceListener::new(bridge.clone(), VoiceConfig::default());

    let host = tokio::spawn({
        let bridge = bridge.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            let (tx, mut commands) = mpsc::channel(4);
            bridge.register_bridge(tx);
            assert_eq!(commands.recv().await, Some(BridgeCommand::Start));
            bridge
                .handle_message(r#"{"type":"STATUS","data":"STARTING"}"#)
                .unwrap();
            bridge
                .handle_message(r#"{"type":"RESULT","data":"take me home"}"#)
                .unwrap();
            bridge.handle_message(r#"{"type":"END"}"#).unwrap();
        }
    });

    assert_eq!(
        tokio_test::assert_ok!(listener.listen_once().await),
        ListenOutcome::Heard("take me home".into())
    );
    host.await.unwrap();
}

#[tokio::test]
async fn recognizer_failures_surface_as_core_errors() {
    struct Broken;

    #[async_trait]
    impl SpeechRecognizer for Broken {
        async fn start_listening(&self) -> NaviaResult<mpsc::Receiver<RecognitionEvent>> {
            Err(NaviaError::Speech("microphone busy".into()))
        }

        async fn stop_listening(&self) -> NaviaResult<()> {
            Ok(())
        }
    }

    let listener = VoiceListener::new(Arc::new(Broken), VoiceConfig::default());
    let err = tokio_test::assert_err!(listener.listen_once().await);
    assert!(matches!(err, VoiceError::Core(NaviaError::Speech(_))));
    assert_eq!(listener.state(), ListenState::Idle);
}
