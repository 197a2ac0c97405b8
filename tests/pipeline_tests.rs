/// Pipeline integration tests — config file to rendered stream.
use reverie::core::backend::ScriptedBackend;
use reverie::core::display::{RecordingRenderer, RenderOp};
use reverie::core::events::{RecordingSink, StreamEvent};
use reverie::core::pipeline::{StreamEngine, StreamError};
use reverie::core::prompt::PromptKind;
use reverie::core::session::StopReason;
use reverie::core::stop::StopSignal;
use reverie::core::topic::TopicOrigin;
use reverie::schema::config::{ConfigError, StreamConfig};
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const FIXTURE: &str = "tests/fixtures/test_config.ron";

fn fragments(sink: &RecordingSink) -> Vec<(u64, String)> {
    sink.events()
        .into_iter()
        .filter_map(|event| match event {
            StreamEvent::Fragment { seq, text } => Some((seq, text)),
            _ => None,
        })
        .collect()
}

#[test]
fn fixture_config_streams_with_offline_backend() {
    let sink = RecordingSink::new();
    let renderer = RecordingRenderer::new(30);
    let engine = StreamEngine::builder()
        .config_path(FIXTURE)
        .with_events(Arc::new(sink.clone()))
        .build()
        .unwrap();

    let max_words = engine
        .persona()
        .max_words(engine.config().streaming.max_words_per_chunk);
    assert!(["tides", "clockwork"].contains(&engine.topic()));

    let summary = engine.run(renderer.clone()).unwrap();
    assert_eq!(summary.reason, StopReason::IterationLimit);
    assert_eq!(summary.iterations, 3);
    assert!(summary.fragments > 0);

    let emitted = fragments(&sink);
    assert_eq!(emitted.len() as u64, summary.fragments);
    for (index, (seq, text)) in emitted.iter().enumerate() {
        assert_eq!(*seq, index as u64 + 1, "sequence numbers are gap-free");
        assert!(
            text.split_whitespace().count() <= max_words,
            "fragment over {} words: {}",
            max_words,
            text
        );
    }

    // Every fragment was typed out in full on the display.
    let renders: Vec<String> = renderer
        .ops()
        .into_iter()
        .filter_map(|op| match op {
            RenderOp::Render(text) => Some(text),
            _ => None,
        })
        .collect();
    for (_, text) in &emitted {
        assert!(
            renders.iter().any(|shown| shown.ends_with(text.as_str())),
            "never displayed: {}",
            text
        );
    }

    assert!(matches!(
        sink.events().last(),
        Some(StreamEvent::Stopped {
            reason: StopReason::IterationLimit,
            iterations: 3,
            ..
        })
    ));
}

#[test]
fn seeded_runs_are_identical() {
    let run = || {
        let sink = RecordingSink::new();
        let engine = StreamEngine::builder()
            .config_path(FIXTURE)
            .seed(99)
            .with_events(Arc::new(sink.clone()))
            .build()
            .unwrap();
        let persona = engine.persona().name.clone();
        let topic = engine.topic().to_string();
        engine.run(RecordingRenderer::new(30)).unwrap();
        (persona, topic, fragments(&sink))
    };
    assert_eq!(run(), run());
}

#[test]
fn drift_tangent_fires_every_interval() {
    // Three one-sentence fragments per iteration, drift interval of three.
    let backend = ScriptedBackend::new(["One. Two. Three.", "Four. Five. Six.", "Seven."]);
    let handle = backend.clone();
    let sink = RecordingSink::new();

    let mut config = StreamConfig::load_from_ron(std::path::Path::new(FIXTURE)).unwrap();
    config.streaming.max_words_per_chunk = 1;
    config.personas.retain(|persona| persona.name == "mira");

    let engine = StreamEngine::builder()
        .with_config(config)
        .with_backend(Box::new(backend))
        .with_events(Arc::new(sink.clone()))
        .build()
        .unwrap();
    let summary = engine.run(RecordingRenderer::new(100)).unwrap();

    assert_eq!(summary.fragments, 7);
    assert_eq!(summary.tangents, 2);

    let kinds: Vec<PromptKind> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            StreamEvent::Prompt { kind, .. } => Some(kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![PromptKind::Continuation, PromptKind::Tangent, PromptKind::Tangent]
    );
    assert!(handle.prompts()[1].contains("Then continue the stream in character about"));
}

#[test]
fn stop_signal_ends_unbounded_stream() {
    let stop = StopSignal::new();
    let engine = StreamEngine::builder()
        .config_path(FIXTURE)
        .max_iterations(None)
        .with_stop_signal(stop.clone())
        .build()
        .unwrap();

    let controller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        stop.stop();
    });

    let summary = engine.run(RecordingRenderer::new(30)).unwrap();
    controller.join().unwrap();
    assert_eq!(summary.reason, StopReason::Requested);
}

#[test]
fn generated_topic_falls_back_when_backend_misbehaves() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"StreamConfig(
            personas: [Persona(name: "mira", template: Prefix("You are Mira."))],
            topics: Topics(use_backend: true, attempts: 2, fallback: "paper boats"),
            streaming: Streaming(
                initial_pause_seconds: 0.0,
                inter_chunk_pause_seconds: 0.0,
                inter_iteration_pause_seconds: 0.0,
                max_iterations: Some(1),
            ),
            display: Display(word_delay_ms: 0, fade_pause_ms: 0),
            logging: Logging(directory: None),
        )"#
    )
    .unwrap();

    let sink = RecordingSink::new();
    let backend = ScriptedBackend::new([
        "Here is a topic: clouds",
        "Sure, do not worry",
        "Boats drift on the pond.",
    ]);
    let engine = StreamEngine::builder()
        .config_path(file.path())
        .with_backend(Box::new(backend))
        .with_events(Arc::new(sink.clone()))
        .build()
        .unwrap();

    assert_eq!(engine.topic(), "paper boats");
    assert_eq!(engine.topic_origin(), TopicOrigin::Fallback);

    let summary = engine.run(RecordingRenderer::new(100)).unwrap();
    assert_eq!(summary.fragments, 1);
    assert_eq!(
        fragments(&sink),
        vec![(1, "Boats drift on the pond.".to_string())]
    );
}

#[test]
fn missing_config_file_is_reported() {
    let result = StreamEngine::builder()
        .config_path("tests/fixtures/does_not_exist.ron")
        .build();
    assert!(matches!(
        result,
        Err(StreamError::Config(ConfigError::Io(_)))
    ));
}
