use sitedex::config::{Config, Overrides, PROJECT_FILE};
use std::path::Path;

// Kept in its own test binary: it changes the process working directory.
#[test]
fn finds_project_file_above_relative_start() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("pages/posts")).unwrap();
    std::fs::write(root.join(PROJECT_FILE), "title: Relative\n").unwrap();

    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(root.join("pages/posts")).unwrap();
    let result = Config::from_directory(Path::new("."), &Overrides::default());
    std::env::set_current_dir(previous).unwrap();

    let config = result.unwrap();
    assert_eq!("Relative", config.site.title);
    assert_eq!(
        root.canonicalize().unwrap(),
        config.root_directory
    );
}
