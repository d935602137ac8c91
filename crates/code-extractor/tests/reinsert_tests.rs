// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Integration tests for re-injecting extracted history
//!
//! The scenarios start from a plain extraction, merge the extract branch back
//! into the original repository (published as a bare repository), add new
//! work to a clone of the extracted repository and then re-inject it.


use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use code_extractor::config::ExtractionConfig;
use code_extractor::detect::Strategy;
use code_extractor::reinject::{Stage, side_channel_paths};
use code_extractor::{ExtractError, TransferTag, pipeline};
use extractor_git::GitError;
use similar_asserts::assert_eq;
use test_utils::{
    ConfigFile, Reinsert, TempTestDir, TestGitRepo, assert_same_blob, base_repo,
};

const MERGE_MESSAGE: &str = "Merged branch 'extract_my_extractions' into master";

/// Repositories shared by the reinsertion scenarios
struct Scenario {
    tmp: TempTestDir,
    source: TestGitRepo,
    bare: PathBuf,
    upstream: TestGitRepo,
}

impl Scenario {
    /// Extract `foo`, merge the extract branch into the original, publish it
    /// and clone the extracted repository for new work
    fn new(name: &str) -> Self {
        let tmp = TempTestDir::new(name);
        let source = base_repo(&tmp);
        let extracted = tmp.join("extracted.git");
        let config = ConfigFile::basic(source.path(), &extracted);
        let config = ExtractionConfig::load(config.write(&tmp)).expect("config loads");
        pipeline::run(&config).expect("initial extraction succeeds");

        let bare = TestGitRepo::init_bare(tmp.join("bare_original.git"));
        let bare_url = bare.to_str().expect("utf8 path").to_string();
        let extracted = TestGitRepo::open(extracted);
        extracted.git(&["push", &bare_url, "extract_my_extractions"]);

        source.git(&["push", &bare_url, "master"]);
        source.git(&[
            "fetch",
            &bare_url,
            "extract_my_extractions:extract_my_extractions",
        ]);
        source.git(&[
            "merge",
            "--no-ff",
            "-m",
            MERGE_MESSAGE,
            "extract_my_extractions",
        ]);
        source.git(&["push", &bare_url, "master"]);

        let upstream =
            TestGitRepo::clone_from(extracted.path(), tmp.join("cloned_extractions.git"));
        upstream.git(&["checkout", "-B", "master", "origin/master"]);

        Self {
            tmp,
            source,
            bare,
            upstream,
        }
    }

    /// The two commits made in the extracted repository after extraction
    fn add_new_work(&self) {
        self.upstream.write_file("foo/bar", "Updated Bar Content");
        self.upstream.commit("update bar content");
        self.upstream.write_file("foo/baz", "Baz Content");
        self.upstream.commit("add new baz");
    }

    fn config(&self, destination: &str, extra_cmds: &[&str]) -> ConfigFile {
        ConfigFile {
            name: "the_extracted".into(),
            destination: self.tmp.join(destination),
            upstream: self.upstream.path().to_path_buf(),
            upstream_name: "MyOrg/repo".into(),
            extractions: vec!["foo".into()],
            reinsert: Some(Reinsert {
                target_name: "MyOrg/extracted_repo".into(),
                target_remote: self.bare.clone(),
                extra_cmds: extra_cmds.iter().map(|c| c.to_string()).collect(),
            }),
        }
    }

    fn reinsert(&self, config: &ConfigFile) -> code_extractor::Result<pipeline::RunReport> {
        let config = ExtractionConfig::load(config.write(&self.tmp)).expect("config loads");
        pipeline::run(&config)
    }
}

const MOVE_INTO_LIB: &[&str] = &[
    "mkdir lib",
    "mv foo lib",
    "git add -A",
    "git -c user.name='Test Author' -c user.email=test@example.com commit -m 'Move foo/ into lib/'",
];

// ============================================================================
// The un-extract scenario
// ============================================================================

#[test]
fn test_unextract_an_extraction() {
    let scenario = Scenario::new("reinsert_unextract");
    scenario.add_new_work();

    let config = scenario.config("new_upstream.git", MOVE_INTO_LIB);
    scenario.reinsert(&config).expect("reinsert succeeds");
    let dest = TestGitRepo::open(scenario.tmp.join("new_upstream.git"));

    assert_eq!(
        dest.subjects("master"),
        vec![
            "Move foo/ into lib/",
            "add new baz",
            "update bar content",
            "Re-insert extractions from MyOrg/extracted_repo",
            MERGE_MESSAGE,
            "Extract my_extractions",
            "Commit #3",
            "add Bar content",
            "Initial Commit",
        ]
    );
    assert_eq!(dest.current_branch(), "master");
    assert!(!dest.exists("foo"));
    assert!(dest.exists("qux"));
    assert!(dest.exists("lib/foo/bar"));
    assert!(dest.exists("lib/foo/baz"));
    assert_eq!(
        fs::read_to_string(dest.path().join("lib/foo/bar")).expect("read bar"),
        "Updated Bar Content"
    );
    assert_same_blob(&dest, "master:lib/foo/baz", &scenario.upstream, "master:foo/baz");
    assert_same_blob(&dest, "master:qux", &scenario.source, "master:qux");
}

#[test]
fn test_reinsert_report_and_root_message() {
    let scenario = Scenario::new("reinsert_report");
    scenario.add_new_work();

    let config = scenario.config("new_upstream.git", &[]);
    let report = scenario.reinsert(&config).expect("reinsert succeeds");
    let dest = TestGitRepo::open(scenario.tmp.join("new_upstream.git"));

    let reinsert = report.reinsert.expect("reinsert details");
    assert_eq!(reinsert.stage, Stage::Complete);
    assert_eq!(reinsert.strategy, Strategy::Tags);
    assert_eq!(reinsert.commits_injected, 3);
    assert_eq!(reinsert.target_tip, scenario.source.head_sha());
    assert!(reinsert.regrafted_root.is_some());
    assert_eq!(reinsert.regrafted_root, reinsert.boundary);

    let root = dest.message("master~2");
    assert!(root.starts_with("Re-insert extractions from MyOrg/extracted_repo\n\nadd Bar content\n\n"));
    assert!(root.contains("Original-Author: Test Author <test@example.com> "));
    assert!(root.contains("Original-Committer: Test Author <test@example.com> "));
    let tag = TransferTag::find(&root).expect("root is tagged");
    assert_eq!(tag.identity, "MyOrg/repo");
    assert_eq!(
        scenario.upstream.message(&tag.commit).lines().next(),
        Some("add Bar content")
    );

    let parent = dest.rev_parse("master~3");
    assert_eq!(parent, scenario.source.head_sha());
}

#[test]
fn test_side_channel_files_written() {
    let scenario = Scenario::new("reinsert_side_channel");
    scenario.add_new_work();

    let config = scenario.config("new_upstream.git", &[]);
    scenario.reinsert(&config).expect("reinsert succeeds");
    let dest = TestGitRepo::open(scenario.tmp.join("new_upstream.git"));

    let (message_path, boundary_path) = side_channel_paths(&scenario.tmp.join("new_upstream.git"));
    let message = fs::read_to_string(message_path).expect("message file");
    let boundary = fs::read_to_string(boundary_path).expect("boundary file");

    assert!(message.starts_with("Re-insert extractions from MyOrg/extracted_repo"));
    assert_eq!(message.trim_end(), dest.message("master~2").trim_end());
    assert_eq!(boundary.len(), 40);
    assert_eq!(
        dest.git(&["log", "-1", "--format=%s", &boundary]).trim(),
        "add Bar content"
    );
}

// ============================================================================
// Merge preservation
// ============================================================================

#[test]
fn test_merges_among_new_commits_are_preserved() {
    let scenario = Scenario::new("reinsert_merges");
    let upstream = &scenario.upstream;
    upstream.write_file("foo/bar", "Updated Bar Content");
    upstream.commit("update bar content");
    upstream.git(&["checkout", "-b", "side"]);
    upstream.write_file("foo/side", "side");
    upstream.commit("side change");
    upstream.git(&["checkout", "master"]);
    upstream.write_file("foo/main", "main");
    upstream.commit("main change");
    upstream.git(&["merge", "--no-ff", "-m", "Merge side", "side"]);

    let config = scenario.config("new_upstream.git", &[]);
    scenario.reinsert(&config).expect("reinsert succeeds");
    let dest = TestGitRepo::open(scenario.tmp.join("new_upstream.git"));

    let target_tip = scenario.source.head_sha();
    let new_merges = dest.git(&[
        "rev-list",
        "--merges",
        "master",
        &format!("^{target_tip}"),
    ]);
    let new_merges: Vec<&str> = new_merges.lines().collect();
    assert_eq!(new_merges.len(), 1);

    let parents = dest.git(&["log", "-1", "--format=%P", new_merges[0]]);
    assert_eq!(parents.split_whitespace().count(), 2);
    assert_eq!(
        dest.git(&["log", "-1", "--format=%s", new_merges[0]]).trim(),
        "Merge side"
    );
    for file in ["foo/bar", "foo/side", "foo/main", "baz", "qux"] {
        assert!(dest.exists(file), "{file} missing after reinsert");
    }
}

// ============================================================================
// Renames into the extraction
// ============================================================================

#[test]
fn test_history_before_rename_into_paths_survives() {
    let scenario = Scenario::new("reinsert_rename");
    let upstream = &scenario.upstream;
    upstream.write_file("other/x", "line one\nline two\nline three\nline four\n");
    upstream.commit("add other x");
    upstream.git(&["mv", "other/x", "foo/x"]);
    upstream.commit("move x into foo");

    let config = scenario.config("new_upstream.git", &[]);
    let report = scenario.reinsert(&config).expect("reinsert succeeds");
    let dest = TestGitRepo::open(scenario.tmp.join("new_upstream.git"));

    assert_eq!(report.reinsert.expect("reinsert details").commits_injected, 3);
    assert_eq!(
        &dest.subjects("master")[..3],
        &[
            "move x into foo",
            "add other x",
            "Re-insert extractions from MyOrg/extracted_repo",
        ]
    );
    let before_rename = dest.files("master~1");
    assert!(before_rename.contains(&"other/x".to_string()));
    assert!(!before_rename.contains(&"foo/x".to_string()));

    let after_rename = dest.files("master");
    assert!(after_rename.contains(&"foo/x".to_string()));
    assert!(!after_rename.contains(&"other/x".to_string()));
    assert_same_blob(&dest, "master:foo/x", upstream, "master:foo/x");
}

// ============================================================================
// Fallback detection
// ============================================================================

/// Target published to a bare repository and a plain clone of the source
/// holding new work; neither history carries transfer tags
fn untagged_scenario(name: &str, remove_foo: bool) -> Scenario {
    let tmp = TempTestDir::new(name);
    let source = base_repo(&tmp);
    let upstream = TestGitRepo::clone_from(source.path(), tmp.join("plain_clone.git"));

    if remove_foo {
        source.git(&["rm", "-r", "-q", "foo"]);
        source.commit("Remove foo");
    }
    let bare = TestGitRepo::init_bare(tmp.join("bare_original.git"));
    source.git(&["push", bare.to_str().expect("utf8 path"), "master"]);

    upstream.write_file("foo/bar", "Updated Bar Content");
    upstream.commit("update bar content");

    Scenario {
        tmp,
        source,
        bare,
        upstream,
    }
}

#[test]
fn test_untagged_target_uses_fallback_detection() {
    let scenario = untagged_scenario("reinsert_fallback", true);

    let config = scenario.config("new_upstream.git", &[]);
    let report = scenario.reinsert(&config).expect("reinsert succeeds");
    let dest = TestGitRepo::open(scenario.tmp.join("new_upstream.git"));

    let reinsert = report.reinsert.expect("reinsert details");
    assert_eq!(reinsert.strategy, Strategy::Fallback);
    assert_eq!(reinsert.commits_injected, 2);
    assert_eq!(reinsert.regrafted_root, reinsert.boundary);
    assert_eq!(reinsert.target_tip, scenario.source.head_sha());

    assert_eq!(
        dest.subjects("master"),
        vec![
            "update bar content",
            "Re-insert extractions from MyOrg/extracted_repo",
            "Remove foo",
            "Commit #3",
            "add Bar content",
            "Initial Commit",
        ]
    );
    assert!(
        dest.message("master~1")
            .starts_with("Re-insert extractions from MyOrg/extracted_repo\n\nadd Bar content\n")
    );
    assert_eq!(
        fs::read_to_string(dest.path().join("foo/bar")).expect("read bar"),
        "Updated Bar Content"
    );
    assert!(dest.exists("baz"));
    assert!(dest.exists("qux"));
}

#[test]
fn test_root_is_kept_when_target_already_has_its_content() {
    let scenario = untagged_scenario("reinsert_fallback_same_tree", false);

    let config = scenario.config("new_upstream.git", &[]);
    let report = scenario.reinsert(&config).expect("reinsert succeeds");
    let dest = TestGitRepo::open(scenario.tmp.join("new_upstream.git"));

    let reinsert = report.reinsert.expect("reinsert details");
    assert_eq!(reinsert.strategy, Strategy::Fallback);
    assert_eq!(reinsert.commits_injected, 2);

    // the synthetic root changes nothing but still marks the reinjection
    assert_eq!(
        dest.git(&["rev-parse", "master~1^{tree}"]),
        scenario.source.git(&["rev-parse", "master^{tree}"])
    );
    assert_eq!(
        &dest.subjects("master")[..3],
        &[
            "update bar content",
            "Re-insert extractions from MyOrg/extracted_repo",
            "Commit #3",
        ]
    );
}

// ============================================================================
// Duplicate-set monotonicity
// ============================================================================

#[test]
fn test_second_round_never_regrafts() {
    let scenario = Scenario::new("reinsert_two_rounds");
    let bare_url = scenario.bare.to_str().expect("utf8 path").to_string();
    scenario.add_new_work();

    let first = scenario.config("round_one.git", &[]);
    scenario.reinsert(&first).expect("first round succeeds");
    let round_one = TestGitRepo::open(scenario.tmp.join("round_one.git"));
    round_one.git(&["push", &bare_url, "master"]);

    scenario.upstream.write_file("foo/bar", "Second Round Bar");
    scenario.upstream.commit("second round change");

    let second = scenario.config("round_two.git", &[]);
    let report = scenario.reinsert(&second).expect("second round succeeds");
    let round_two = TestGitRepo::open(scenario.tmp.join("round_two.git"));

    let reinsert = report.reinsert.expect("reinsert details");
    assert_eq!(reinsert.strategy, Strategy::Tags);
    assert!(reinsert.regrafted_root.is_none());
    assert_eq!(reinsert.commits_injected, 1);

    let subjects = round_two.subjects("master");
    assert_eq!(&subjects[..4], &[
        "second round change",
        "add new baz",
        "update bar content",
        "Re-insert extractions from MyOrg/extracted_repo",
    ]);
    assert_eq!(
        subjects
            .iter()
            .filter(|s| s.starts_with("Re-insert extractions"))
            .count(),
        1
    );

    let mut seen = HashSet::new();
    for message in round_two.messages("master") {
        if let Some(tag) = TransferTag::find(&message) {
            assert!(seen.insert(tag.commit.clone()), "{} grafted twice", tag.commit);
        }
    }
    assert_eq!(
        fs::read_to_string(round_two.path().join("foo/bar")).expect("read bar"),
        "Second Round Bar"
    );
}

#[test]
fn test_nothing_new_resets_to_target() {
    let scenario = Scenario::new("reinsert_nothing_new");
    let bare_url = scenario.bare.to_str().expect("utf8 path").to_string();
    scenario.add_new_work();

    let first = scenario.config("round_one.git", &[]);
    scenario.reinsert(&first).expect("first round succeeds");
    let round_one = TestGitRepo::open(scenario.tmp.join("round_one.git"));
    round_one.git(&["push", &bare_url, "master"]);

    let again = scenario.config("round_two.git", &[]);
    let report = scenario.reinsert(&again).expect("second round succeeds");
    let round_two = TestGitRepo::open(scenario.tmp.join("round_two.git"));

    let reinsert = report.reinsert.expect("reinsert details");
    assert_eq!(reinsert.commits_injected, 0);
    assert_eq!(round_two.rev_parse("master"), round_one.rev_parse("master"));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_replay_conflict_is_fatal() {
    let scenario = Scenario::new("reinsert_conflict");
    let bare_url = scenario.bare.to_str().expect("utf8 path").to_string();
    scenario.add_new_work();

    scenario.source.write_file("foo/bar", "Conflicting Bar");
    scenario.source.commit("re-add bar upstream");
    scenario.source.git(&["push", &bare_url, "master"]);

    let config = scenario.config("new_upstream.git", &[]);
    match scenario.reinsert(&config) {
        Err(ExtractError::Git(GitError::MergeConflict { paths, .. })) => {
            assert_eq!(paths, vec!["foo/bar"]);
        }
        other => panic!("Expected MergeConflict, got {other:?}"),
    }
}

#[test]
fn test_failing_extra_command_is_fatal() {
    let scenario = Scenario::new("reinsert_bad_command");
    scenario.add_new_work();

    let config = scenario.config("new_upstream.git", &["exit 3"]);
    match scenario.reinsert(&config) {
        Err(ExtractError::Git(GitError::CommandFailed { command, .. })) => {
            assert_eq!(command, "exit 3");
        }
        other => panic!("Expected CommandFailed, got {other:?}"),
    }
}
