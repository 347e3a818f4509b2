//! End-to-end processing through the service facade.

mod common;

use std::sync::atomic::Ordering;

use lectern::db::session_repo::ProcessingStatus;
use lectern::db::slide_repo;
use lectern::task::TaskStatus;

use common::{harness, wait_for_terminal, write_audio};

#[test]
fn processing_happy_path() {
    let h = harness();
    let session_id = h.service.create_session(Some("Quaternions")).unwrap();
    let audio = write_audio(h.dir.path(), "lecture.wav");

    let token = h
        .service
        .submit_processing(&session_id, audio.clone())
        .unwrap();
    let record = wait_for_terminal(&h.service, &token);

    assert_eq!(record.status, TaskStatus::Completed);
    assert_eq!(record.progress, Some(100));
    let result = record.result.unwrap();
    assert_eq!(result["session_id"], session_id);
    assert_eq!(result["slides_generated"], 3);
    assert_eq!(result["low_confidence_words"], 1);

    // Durable state agrees with the task record.
    let session = h.service.processing_status(&session_id).unwrap().unwrap();
    assert_eq!(session.status(), ProcessingStatus::Completed);
    assert!(session.transcript.as_deref().unwrap().contains("lecture content"));
    assert_eq!(session.language.as_deref(), Some("en"));

    let deck = slide_repo::list_for_session(h.service.database(), &session_id).unwrap();
    assert_eq!(deck.len(), 3);
    // Dense numbering from 1.
    for (i, slide) in deck.iter().enumerate() {
        assert_eq!(slide.slide_number, (i + 1) as i64);
    }

    // The uploaded audio is gone.
    assert!(!audio.exists());
}

#[test]
fn transcription_failure_marks_session_failed() {
    let h = harness();
    h.transcriber_fail.store(true, Ordering::SeqCst);

    let session_id = h.service.create_session(None).unwrap();
    let audio = write_audio(h.dir.path(), "bad.wav");

    let token = h
        .service
        .submit_processing(&session_id, audio.clone())
        .unwrap();
    let record = wait_for_terminal(&h.service, &token);

    assert_eq!(record.status, TaskStatus::Failed);
    assert!(record.error.as_deref().unwrap().contains("fake engine down"));

    let session = h.service.processing_status(&session_id).unwrap().unwrap();
    assert_eq!(session.status(), ProcessingStatus::Failed);
    assert!(!session.error.as_deref().unwrap().is_empty());
    // Cleanup happens on the failure path too.
    assert!(!audio.exists());
}

#[test]
fn generation_failure_preserves_transcript() {
    let h = harness();
    h.generator_fail.store(true, Ordering::SeqCst);

    let session_id = h.service.create_session(None).unwrap();
    let audio = write_audio(h.dir.path(), "gen-fail.wav");

    let token = h.service.submit_processing(&session_id, audio).unwrap();
    let record = wait_for_terminal(&h.service, &token);
    assert_eq!(record.status, TaskStatus::Failed);

    let session = h.service.processing_status(&session_id).unwrap().unwrap();
    assert_eq!(session.status(), ProcessingStatus::Failed);
    // Transcription succeeded first, so the transcript survived.
    assert!(session.transcript.is_some());
    assert_eq!(
        slide_repo::count_for_session(h.service.database(), &session_id).unwrap(),
        0
    );
}

#[test]
fn reprocessing_replaces_the_deck() {
    let h = harness();
    let session_id = h.service.create_session(None).unwrap();

    let audio1 = write_audio(h.dir.path(), "take1.wav");
    let token1 = h.service.submit_processing(&session_id, audio1).unwrap();
    assert_eq!(
        wait_for_terminal(&h.service, &token1).status,
        TaskStatus::Completed
    );

    let audio2 = write_audio(h.dir.path(), "take2.wav");
    let token2 = h.service.submit_processing(&session_id, audio2).unwrap();
    assert_eq!(
        wait_for_terminal(&h.service, &token2).status,
        TaskStatus::Completed
    );

    // Replaced, not appended.
    assert_eq!(
        slide_repo::count_for_session(h.service.database(), &session_id).unwrap(),
        3
    );
}

#[test]
fn processing_unknown_session_fails_cleanly() {
    let h = harness();
    let audio = write_audio(h.dir.path(), "orphan.wav");

    let token = h.service.submit_processing("no-such-session", audio).unwrap();
    let record = wait_for_terminal(&h.service, &token);

    assert_eq!(record.status, TaskStatus::Failed);
    assert!(record.error.as_deref().unwrap().contains("no-such-session"));
}

#[test]
fn task_records_can_be_cleaned_up() {
    let h = harness();
    let session_id = h.service.create_session(None).unwrap();
    let audio = write_audio(h.dir.path(), "cleanup.wav");

    let token = h.service.submit_processing(&session_id, audio).unwrap();
    wait_for_terminal(&h.service, &token);

    std::thread::sleep(std::time::Duration::from_millis(20));
    let removed = h.service.cleanup_tasks(chrono::Duration::zero());
    assert_eq!(removed, 1);
    assert!(h.service.task_status(&token).is_none());

    // Durable status is unaffected by registry cleanup.
    let session = h.service.processing_status(&session_id).unwrap().unwrap();
    assert_eq!(session.status(), ProcessingStatus::Completed);
}

#[test]
fn progress_events_reach_subscribers() {
    let h = harness();
    let mut events = h.service.subscribe_progress();

    let session_id = h.service.create_session(None).unwrap();
    let audio = write_audio(h.dir.path(), "progress.wav");
    let token = h.service.submit_processing(&session_id, audio).unwrap();
    wait_for_terminal(&h.service, &token);

    let mut stages = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.session_id, session_id);
        stages.push(event.stage);
    }
    use lectern::pipeline::Stage;
    assert_eq!(
        stages,
        vec![
            Stage::Transcribing,
            Stage::Generating,
            Stage::Persisting,
            Stage::Completed
        ]
    );
}

#[test]
fn shutdown_rejects_new_work() {
    let h = harness();
    h.service.shutdown();

    let session_id = "whatever";
    let audio = write_audio(h.dir.path(), "late.wav");
    assert!(h.service.submit_processing(session_id, audio).is_err());
}
