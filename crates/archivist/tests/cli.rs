//! CLI parsing and end-to-end command tests

use archivist::cli::{context, run, Cli, CommandStatus, Commands};
use archivist_db::ArchiveDb;
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct TestEnv {
    _temp: TempDir,
    pub archive_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let archive_dir = temp.path().join("archive");
        let db_path = temp.path().join("index.db");
        let config_path = temp.path().join("archivist.toml");
        fs::create_dir_all(&archive_dir).unwrap();
        fs::write(
            &config_path,
            format!(
                "root_data_folder = {:?}\ndatabase_path = {:?}\nposts_per_page = 2\n",
                archive_dir.to_string_lossy(),
                db_path.to_string_lossy()
            ),
        )
        .unwrap();
        Self {
            _temp: temp,
            archive_dir,
            db_path,
            config_path,
        }
    }

    fn write_file(&self, name: &str, content: &str) {
        let path = self.archive_dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        fs::write(path, content).unwrap();
    }

    fn cli(&self, args: &[&str]) -> Cli {
        let config = self.config_path.to_string_lossy().to_string();
        let mut argv = vec!["archivist", "--config", config.as_str()];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }
}

fn post_count(db_path: &Path, username: &str) -> u64 {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let db = ArchiveDb::open_existing(db_path).await.unwrap();
        db.count_posts(username).await.unwrap()
    })
}

#[test]
fn test_parse_scan_user() {
    let cli = Cli::try_parse_from(["archivist", "scan-user", "alice", "--force-rescan"]).unwrap();
    assert_eq!(
        cli.command,
        Commands::ScanUser {
            username: "alice".to_string(),
            force_rescan: true,
        }
    );
}

#[test]
fn test_parse_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "archivist",
        "list-posts",
        "bob",
        "--page",
        "3",
        "--root",
        "/srv/archive",
        "-v",
    ])
    .unwrap();
    assert!(cli.verbose);
    assert_eq!(cli.root, Some(PathBuf::from("/srv/archive")));
    assert_eq!(
        cli.command,
        Commands::ListPosts {
            username: "bob".to_string(),
            page: 3,
            per_page: None,
            json: false,
        }
    );
}

#[test]
fn test_parse_rejects_unknown_command() {
    assert!(Cli::try_parse_from(["archivist", "scan-everything"]).is_err());
    assert!(Cli::try_parse_from(["archivist", "scan-user"]).is_err());
}

#[test]
fn test_cli_overrides_config_file() {
    let env = TestEnv::new();
    let cli = env.cli(&["--root", "/elsewhere", "list-users"]);
    let config = context::load_config(&cli).unwrap();
    assert_eq!(config.root_data_folder, PathBuf::from("/elsewhere"));
    assert_eq!(config.database_path, env.db_path);
    assert_eq!(config.posts_per_page, 2);
}

#[tokio::test]
async fn test_scan_then_list() {
    let env = TestEnv::new();
    env.write_file("alice/1.jpg", "jpg");
    env.write_file("alice/2.json", r#"{"ts": 20, "text": "second"}"#);
    env.write_file("bob/5_1.png", "png");

    let status = run(env.cli(&["scan-all-users"])).await.unwrap();
    assert_eq!(status, CommandStatus::Success);

    let status = run(env.cli(&["list-posts", "alice", "--json"])).await.unwrap();
    assert_eq!(status, CommandStatus::Success);

    let status = run(env.cli(&["list-users"])).await.unwrap();
    assert_eq!(status, CommandStatus::Success);

    let status = run(env.cli(&["scan-user", "alice", "--force-rescan"])).await.unwrap();
    assert_eq!(status, CommandStatus::Success);
}

#[test]
fn test_scan_user_missing_directory_fails() {
    let env = TestEnv::new();
    env.write_file("alice/1.jpg", "jpg");

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let status = runtime
        .block_on(run(env.cli(&["scan-user", "ghost"])))
        .unwrap();
    assert_eq!(status, CommandStatus::Failed);

    let status = runtime
        .block_on(run(env.cli(&["scan-user", "alice"])))
        .unwrap();
    assert_eq!(status, CommandStatus::Success);
    drop(runtime);

    assert_eq!(post_count(&env.db_path, "alice"), 1);
    assert_eq!(post_count(&env.db_path, "ghost"), 0);
}

#[tokio::test]
async fn test_invalid_config_is_an_error() {
    let env = TestEnv::new();
    fs::write(&env.config_path, "posts_per_page = 0\n").unwrap();
    assert!(run(env.cli(&["list-users"])).await.is_err());
}
