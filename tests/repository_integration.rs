//! Integration tests for on-disk repositories.
//!
//! These exercise persistence across reopen, concurrent reference
//! updates, and resuming an interrupted rebase from another handle.

use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;

use grove::core::types::{FileMode, HashAlgorithm, ObjectType, Oid, RefName, Signature, Time};
use grove::diff::FsWorkdir;
use grove::error::ErrorKind;
use grove::merge::MergeOptions;
use grove::object::TreeUpdater;
use grove::rebase::{Rebase, RebaseOptions, RebaseStatus, RebaseStep};
use grove::{InitOptions, Repository, RepositoryState};

fn sig(time: i64) -> Signature {
    Signature::new("Test User", "test@example.com", Time::new(time, 0)).unwrap()
}

fn commit(repo: &Repository, branch: &str, parent: Option<Oid>, files: &[(&str, &str)], time: i64) -> Oid {
    let mut updater = TreeUpdater::new(repo.odb());
    for (path, content) in files {
        let blob = repo.odb().write_blob(content.as_bytes()).unwrap();
        updater.upsert(*path, FileMode::Blob, blob);
    }
    let tree = updater.apply(None).unwrap();
    let name = RefName::new(format!("refs/heads/{branch}")).unwrap();
    let parents: Vec<Oid> = parent.into_iter().collect();
    repo.commit(Some(&name), &sig(time), &sig(time), &format!("commit at {time}"), &tree, &parents)
        .unwrap()
}

#[test]
fn objects_and_refs_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let root = {
        let repo = Repository::init(dir.path(), &InitOptions::default()).unwrap();
        commit(&repo, "main", None, &[("a/b.txt", "content\n")], 10)
    };

    let nested = dir.path().join("src/deeper");
    std::fs::create_dir_all(&nested).unwrap();
    let repo = Repository::open(&nested).unwrap();
    assert_eq!(repo.head().unwrap().oid, root);
    let tree = repo.find_tree(&repo.find_commit(&root).unwrap().tree).unwrap();
    assert!(tree.get("a").unwrap().is_tree());
    assert_eq!(repo.odb().read_header(&root).unwrap().0, ObjectType::Commit);
    assert_eq!(repo.state().unwrap(), RepositoryState::Clean);
}

#[test]
fn sha256_repository_uses_long_ids() {
    let dir = TempDir::new().unwrap();
    let options = InitOptions {
        hash: HashAlgorithm::Sha256,
        ..InitOptions::default()
    };
    Repository::init(dir.path(), &options).unwrap();
    let repo = Repository::open(dir.path()).unwrap();
    assert_eq!(repo.hash_algorithm(), HashAlgorithm::Sha256);
    let blob = repo.odb().write_blob(b"hello").unwrap();
    assert_eq!(blob.to_hex().len(), 64);
}

#[test]
fn open_outside_repository_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = Repository::open(dir.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn concurrent_cas_has_exactly_one_winner() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path(), &InitOptions::default()).unwrap();
    let base = commit(&repo, "main", None, &[("f", "0\n")], 1);
    let candidates: Vec<Oid> = (0..8)
        .map(|i| {
            let tree = repo.odb().peel_to_tree(&base).unwrap();
            repo.commit(None, &sig(100 + i), &sig(100 + i), "candidate", &tree, &[base])
                .unwrap()
        })
        .collect();

    let main = RefName::new("refs/heads/main").unwrap();
    let wins = AtomicUsize::new(0);
    let conflicts = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for candidate in &candidates {
            let (main, wins, conflicts, path) = (&main, &wins, &conflicts, dir.path());
            scope.spawn(move || {
                // Each thread has its own handle, as separate processes would.
                let repo = Repository::open(path).unwrap();
                match repo.refs().compare_and_swap(main, Some(base), *candidate, "race") {
                    Ok(()) => wins.fetch_add(1, Ordering::SeqCst),
                    Err(e) => {
                        assert!(matches!(e.kind(), ErrorKind::Conflict | ErrorKind::Locked), "{e}");
                        conflicts.fetch_add(1, Ordering::SeqCst)
                    }
                };
            });
        }
    });

    assert_eq!(wins.load(Ordering::SeqCst), 1);
    assert_eq!(conflicts.load(Ordering::SeqCst), candidates.len() - 1);
    let winner = repo.refs().resolve(&main).unwrap();
    assert!(candidates.contains(&winner));
}

#[test]
fn paused_rebase_resumes_from_another_handle() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path(), &InitOptions::default()).unwrap();
    let base = commit(&repo, "main", None, &[("f", "base\n"), ("g", "1\n")], 1);
    let upstream = commit(&repo, "main", Some(base), &[("f", "main\n"), ("g", "1\n")], 2);
    let topic = RefName::new("refs/heads/topic").unwrap();
    repo.refs().create(&topic, base, false, "branch").unwrap();
    let t1 = commit(&repo, "topic", Some(base), &[("f", "topic\n"), ("g", "1\n")], 3);
    commit(&repo, "topic", Some(t1), &[("f", "topic\n"), ("g", "2\n")], 4);

    let options = RebaseOptions {
        committer: Some(sig(50)),
        ..RebaseOptions::default()
    };
    {
        let mut rebase = Rebase::init(&repo, Some(&topic), &upstream, None, options).unwrap();
        assert!(matches!(rebase.next().unwrap(), Some(RebaseStep::Conflicted(..))));
        // Handle dropped while paused, as if the process exited.
    }

    let reopened = Repository::open(dir.path()).unwrap();
    assert_eq!(reopened.state().unwrap(), RepositoryState::Rebase);
    let mut rebase = Rebase::open(&reopened, MergeOptions::default()).unwrap();
    assert_eq!(rebase.status(), RebaseStatus::PausedOnConflict);
    assert_eq!(rebase.current().unwrap().original, t1);

    let mut index = reopened.index().unwrap();
    assert!(index.is_conflicted("f"));
    let resolved = reopened.odb().write_blob(b"main\ntopic\n").unwrap();
    index.resolve("f", FileMode::Blob, resolved).unwrap();
    reopened.write_index(&index).unwrap();

    let step = rebase.resume(None).unwrap();
    assert!(matches!(step, Some(RebaseStep::Applied(..))));
    assert!(rebase.next().unwrap().is_none());
    let tip = rebase.finish().unwrap();

    let repo = Repository::open(dir.path()).unwrap();
    assert_eq!(repo.state().unwrap(), RepositoryState::Clean);
    assert_eq!(repo.refs().resolve(&topic).unwrap(), tip);
    assert_eq!(repo.revparse("topic~2").unwrap(), upstream);
    let tree = repo.find_tree(&repo.odb().peel_to_tree(&tip).unwrap()).unwrap();
    assert_eq!(tree.get("f").unwrap().oid, resolved);
    let committer = repo.find_commit(&tip).unwrap().committer;
    assert_eq!((committer.name.as_str(), committer.email.as_str()), ("Test User", "test@example.com"));
}

#[test]
fn status_reads_the_working_tree_on_disk() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path(), &InitOptions::default()).unwrap();
    commit(&repo, "main", None, &[("f", "one\n"), ("gone", "x\n")], 1);
    assert_eq!(repo.workdir(), Some(dir.path()));

    let mut index = repo.index().unwrap();
    index
        .read_tree(repo.odb(), &repo.head_tree().unwrap().unwrap())
        .unwrap();
    let staged = repo.odb().write_blob(b"two\n").unwrap();
    index.add("f", FileMode::Blob, staged).unwrap();
    repo.write_index(&index).unwrap();
    std::fs::write(dir.path().join("f"), "three\n").unwrap();

    let workdir = FsWorkdir::new(dir.path());
    let list = repo.statuses(Some(&workdir), &repo.status_options()).unwrap();
    let codes: Vec<String> = list.iter().map(ToString::to_string).collect();
    assert_eq!(codes, vec!["MM f", " D gone"]);

    let entry = repo
        .status_file(Some(&workdir), "gone", &repo.status_options())
        .unwrap()
        .unwrap();
    assert!(entry.head_to_index.is_none());
}

#[test]
fn notes_and_blame_across_reopen() {
    let dir = TempDir::new().unwrap();
    let (c1, c2) = {
        let repo = Repository::init(dir.path(), &InitOptions::default()).unwrap();
        let c1 = commit(&repo, "main", None, &[("f", "a\nb\n")], 1);
        let c2 = commit(&repo, "main", Some(c1), &[("f", "a\nb\nc\n")], 2);
        repo.notes(None)
            .unwrap()
            .create(&sig(3), &sig(3), &c1, "first commit", false)
            .unwrap();
        (c1, c2)
    };

    let repo = Repository::open(dir.path()).unwrap();
    let notes = repo.notes(None).unwrap();
    assert_eq!(notes.notes_ref().as_str(), "refs/notes/commits");
    assert_eq!(notes.read(&c1).unwrap().message, b"first commit\n");
    assert_eq!(notes.read(&c2).unwrap_err().kind(), ErrorKind::NotFound);

    let blame = repo.blame_file("f", &repo.blame_options()).unwrap();
    let owners: Vec<(Oid, usize)> = blame.iter().map(|h| (h.final_commit, h.lines_in_hunk)).collect();
    assert_eq!(owners, vec![(c1, 2), (c2, 1)]);
}
