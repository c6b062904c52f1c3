use padhub::logging;
use tracing::level_filters::LevelFilter;
use tracing::Level;

// The subscriber is process-global, so everything runs in one test.
#[test]
fn configured_level_replaces_the_startup_level() {
    let log_level = logging::init().unwrap();
    assert_eq!(LevelFilter::current(), LevelFilter::INFO);

    assert_eq!(log_level.apply("debug").unwrap(), Level::DEBUG);
    assert_eq!(LevelFilter::current(), LevelFilter::DEBUG);

    assert_eq!(log_level.apply("chatty").unwrap(), Level::INFO);
    assert_eq!(LevelFilter::current(), LevelFilter::INFO);

    assert!(matches!(
        logging::init(),
        Err(logging::LoggingError::Init(_))
    ));
}
