//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--repo <path>`: Operate on the repository at (or above) that path
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Grove - content-addressed version-control plumbing
#[derive(Parser, Debug)]
#[command(name = "gv")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Operate on the repository at or above this path
    #[arg(long, global = true, value_name = "PATH")]
    pub repo: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty repository
    #[command(
        name = "init",
        long_about = "Create an empty repository.\n\n\
            The repository is stored in `.grove/` below the given directory, or \
            directly in the directory with --bare. The hash algorithm is fixed \
            at creation time.",
        after_help = "\
EXAMPLES:
    gv init
    gv init --bare --object-format sha256 store.grove
    gv init -b trunk project"
    )]
    Init {
        /// Directory to create the repository in
        path: Option<PathBuf>,

        /// Store the repository directly in PATH
        #[arg(long)]
        bare: bool,

        /// Hash algorithm for object ids
        #[arg(long, value_enum, default_value_t = HashArg::Sha1)]
        object_format: HashArg,

        /// Name of the branch HEAD points at
        #[arg(short = 'b', long, default_value = "main")]
        initial_branch: String,
    },

    /// Compute an object id, optionally storing the object
    #[command(name = "hash-object")]
    HashObject {
        /// Write the object into the object database
        #[arg(short)]
        write: bool,

        /// Object type
        #[arg(short = 't', long = "type", value_enum, default_value_t = KindArg::Blob)]
        kind: KindArg,

        /// Read the object from standard input
        #[arg(long)]
        stdin: bool,

        /// Files to hash
        files: Vec<PathBuf>,
    },

    /// Show an object's type, size or content
    #[command(
        name = "cat-file",
        after_help = "\
EXAMPLES:
    gv cat-file -t HEAD
    gv cat-file -s HEAD^{tree}
    gv cat-file -p main:src/lib.rs"
    )]
    CatFile {
        /// Show the object type
        #[arg(short = 't', conflicts_with_all = ["size", "pretty"])]
        kind: bool,

        /// Show the object size
        #[arg(short = 's', conflicts_with = "pretty")]
        size: bool,

        /// Pretty-print the object content
        #[arg(short = 'p')]
        pretty: bool,

        /// Object to show
        object: String,
    },

    /// List the entries of a tree
    #[command(name = "ls-tree")]
    LsTree {
        /// Recurse into subtrees
        #[arg(short)]
        recursive: bool,

        /// Show only names
        #[arg(long)]
        name_only: bool,

        /// Tree-ish to list
        treeish: String,
    },

    /// Write the index as a tree object
    #[command(name = "write-tree")]
    WriteTree,

    /// Create a commit object from a tree
    #[command(
        name = "commit-tree",
        long_about = "Create a commit object from a tree and print its id.\n\n\
            Author and committer come from `[user]` in the configuration.",
        after_help = "\
EXAMPLES:
    gv commit-tree $(gv write-tree) -m 'initial'
    gv commit-tree $(gv write-tree) -p HEAD -m 'next'"
    )]
    CommitTree {
        /// Tree the commit snapshots
        tree: String,

        /// Parent commits
        #[arg(short = 'p', value_name = "PARENT")]
        parents: Vec<String>,

        /// Commit message
        #[arg(short = 'm', long)]
        message: String,
    },

    /// Update a reference, optionally checking its current value
    #[command(
        name = "update-ref",
        long_about = "Move a reference to a new value.\n\n\
            When OLD is given the update only succeeds if the reference \
            currently has that value; an all-zero OLD requires that the \
            reference does not exist yet.",
        after_help = "\
EXAMPLES:
    gv update-ref refs/heads/main $new
    gv update-ref refs/heads/main $new $old
    gv update-ref -d refs/heads/topic"
    )]
    UpdateRef {
        /// Delete the reference instead
        #[arg(short = 'd')]
        delete: bool,

        /// Reflog message
        #[arg(short = 'm', default_value = "update-ref")]
        message: String,

        /// Reference to update
        name: String,

        /// New value (or, with -d, the expected value)
        new: Option<String>,

        /// Expected current value
        old: Option<String>,
    },

    /// Read or set a symbolic reference
    #[command(name = "symbolic-ref")]
    SymbolicRef {
        /// Print the short name of the target
        #[arg(long)]
        short: bool,

        /// Symbolic reference
        name: String,

        /// New target
        target: Option<String>,
    },

    /// Resolve revision expressions to object ids
    #[command(
        name = "rev-parse",
        after_help = "\
EXAMPLES:
    gv rev-parse HEAD
    gv rev-parse --short main~2
    gv rev-parse 'main^{tree}' 'v1.0^{commit}'"
    )]
    RevParse {
        /// Print the shortest unique prefix
        #[arg(long)]
        short: bool,

        /// Revisions to resolve
        #[arg(required = true)]
        revs: Vec<String>,
    },

    /// Show commit history
    #[command(
        name = "log",
        long_about = "Walk history from the given revisions (HEAD by default).\n\n\
            A revision prefixed with `^` hides its ancestry, and `a..b` shows \
            commits reachable from b but not from a.",
        after_help = "\
EXAMPLES:
    gv log
    gv log --oneline -n 5
    gv log --topo-order --reverse main..topic"
    )]
    Log {
        /// Revisions to start from
        revs: Vec<String>,

        /// Show at most N commits
        #[arg(short = 'n', long = "max-count", value_name = "N")]
        max_count: Option<usize>,

        /// Never show a commit before its children
        #[arg(long)]
        topo_order: bool,

        /// Newest committer date first
        #[arg(long)]
        date_order: bool,

        /// Oldest first
        #[arg(long)]
        reverse: bool,

        /// Follow only the first parent of merges
        #[arg(long)]
        first_parent: bool,

        /// One line per commit
        #[arg(long)]
        oneline: bool,
    },

    /// Find common ancestors of two commits
    #[command(name = "merge-base")]
    MergeBase {
        /// Print every merge base instead of the best one
        #[arg(long)]
        all: bool,

        /// Check whether A is an ancestor of B
        #[arg(long, conflicts_with = "all")]
        is_ancestor: bool,

        a: String,
        b: String,
    },

    /// Compare trees, or a tree with the index
    #[command(
        name = "diff",
        long_about = "Show changes between two trees.\n\n\
            With no revisions, compares HEAD with the index. With one, \
            compares that tree with the index.",
        after_help = "\
EXAMPLES:
    gv diff
    gv diff main topic --stat
    gv diff -M --rename-threshold 30 HEAD~1 HEAD --name-status"
    )]
    Diff {
        /// Old side (defaults to HEAD)
        old: Option<String>,

        /// New side (defaults to the index)
        new: Option<String>,

        /// Show a diffstat
        #[arg(long, conflicts_with = "name_status")]
        stat: bool,

        /// Show status letters and paths
        #[arg(long)]
        name_status: bool,

        /// Detect renames
        #[arg(short = 'M', long)]
        find_renames: bool,

        /// Similarity percentage for renames (implies -M)
        #[arg(long, value_name = "PERCENT", value_parser = clap::value_parser!(u8).range(0..=100))]
        rename_threshold: Option<u8>,

        /// Turn rename detection off
        #[arg(long, conflicts_with_all = ["find_renames", "rename_threshold"])]
        no_renames: bool,

        /// Lines of context
        #[arg(short = 'U', long = "unified", value_name = "N")]
        context: Option<u32>,
    },

    /// Merge two commits without touching HEAD or the index
    #[command(
        name = "merge-tree",
        long_about = "Three-way merge of two commits over their merge base.\n\n\
            Prints the id of the resulting tree. Conflicted files hold conflict \
            markers in that tree and are listed after it; the exit status is 1 \
            when the merge is not clean.",
        after_help = "\
EXAMPLES:
    gv merge-tree main topic
    gv merge-tree --base v1.0 main topic"
    )]
    MergeTree {
        /// Use this commit as the ancestor instead of the merge base
        #[arg(long)]
        base: Option<String>,

        ours: String,
        theirs: String,
    },

    /// Replay commits onto another base
    #[command(
        name = "rebase",
        long_about = "Replay the commits of a branch that are not in UPSTREAM on top of \
            UPSTREAM (or --onto).\n\n\
            When a commit does not apply cleanly the rebase stops. Resolve the \
            index, then run `gv rebase --continue`, or drop the commit with \
            --skip, or give up with --abort.",
        after_help = "\
EXAMPLES:
    gv rebase main
    gv rebase main topic
    gv rebase --onto release main topic
    gv rebase --continue"
    )]
    Rebase {
        /// Upstream whose commits are excluded
        #[arg(required_unless_present_any = ["continue_op", "abort", "skip"])]
        upstream: Option<String>,

        /// Branch to rebase (defaults to HEAD)
        branch: Option<String>,

        /// New base for the replayed commits
        #[arg(long)]
        onto: Option<String>,

        /// Commit the resolved index and resume
        #[arg(long = "continue", conflicts_with_all = ["abort", "skip", "upstream"])]
        continue_op: bool,

        /// Stop and restore the original branch
        #[arg(long, conflicts_with_all = ["skip", "upstream"])]
        abort: bool,

        /// Drop the stopped commit and resume
        #[arg(long, conflicts_with = "upstream")]
        skip: bool,
    },

    /// Show staged, unstaged and untracked changes
    #[command(
        name = "status",
        long_about = "List paths whose state differs between HEAD, the index and \
            the working tree.\n\n\
            Each line has two status columns, for HEAD against the index and \
            for the index against the working tree, followed by the path. \
            `??` marks untracked files and `UU` conflicts.",
        after_help = "\
EXAMPLES:
    gv status
    gv status -M --no-untracked src/"
    )]
    Status {
        /// Leave untracked files out
        #[arg(long)]
        no_untracked: bool,

        /// Detect renames on both sides
        #[arg(short = 'M', long)]
        find_renames: bool,

        /// Limit to these path prefixes
        pathspec: Vec<String>,
    },

    /// Attach, show and remove notes on objects
    #[command(
        name = "notes",
        after_help = "\
EXAMPLES:
    gv notes add -m 'reviewed' HEAD
    gv notes show HEAD~1
    gv notes --ref refs/notes/review list"
    )]
    Notes {
        /// Notes reference (defaults to core.notes_ref)
        #[arg(long = "ref", global = true, value_name = "REF")]
        notes_ref: Option<String>,

        #[command(subcommand)]
        action: NotesCommand,
    },

    /// Show which commit last changed each line of a file
    #[command(
        name = "blame",
        after_help = "\
EXAMPLES:
    gv blame src/lib.rs
    gv blame -L 10,20 --rev v1.0 src/lib.rs
    gv blame -M --first-parent README"
    )]
    Blame {
        /// Blame the file as of this commit (defaults to HEAD)
        #[arg(long)]
        rev: Option<String>,

        /// Only lines START to END, 1-based and inclusive
        #[arg(short = 'L', value_name = "START,END")]
        lines: Option<String>,

        /// Follow only the first parent of merges
        #[arg(long)]
        first_parent: bool,

        /// Follow the file through renames
        #[arg(short = 'M')]
        track_renames: bool,

        /// File to blame
        path: String,
    },

    /// Show the log of changes to a reference
    #[command(name = "reflog")]
    Reflog {
        /// Reference (defaults to HEAD)
        name: Option<String>,

        /// Show at most N entries
        #[arg(short = 'n', value_name = "N")]
        max_count: Option<usize>,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        after_help = "\
EXAMPLES:
    gv completion bash > ~/.local/share/bash-completion/completions/gv
    gv completion zsh > ~/.zfunc/_gv"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// `gv notes` actions.
#[derive(Subcommand, Debug)]
pub enum NotesCommand {
    /// Attach a note to an object
    Add {
        /// Note text
        #[arg(short = 'm', long)]
        message: String,

        /// Replace an existing note
        #[arg(short = 'f', long)]
        force: bool,

        /// Object to annotate (defaults to HEAD)
        object: Option<String>,
    },

    /// Print the note on an object
    Show {
        /// Annotated object (defaults to HEAD)
        object: Option<String>,
    },

    /// List notes as `<note> <object>`
    List,

    /// Remove the note on an object
    Remove {
        /// Annotated object (defaults to HEAD)
        object: Option<String>,
    },
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashArg {
    Sha1,
    Sha256,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindArg {
    Blob,
    Tree,
    Commit,
    Tag,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definitions_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn rename_threshold_is_a_percentage() {
        let cli = Cli::try_parse_from(["gv", "diff", "-M", "a", "b"]).unwrap();
        match cli.command {
            Command::Diff { find_renames, old, new, .. } => {
                assert!(find_renames);
                assert_eq!(old.as_deref(), Some("a"));
                assert_eq!(new.as_deref(), Some("b"));
            }
            other => panic!("unexpected {other:?}"),
        }
        let cli = Cli::try_parse_from(["gv", "diff", "--rename-threshold", "30"]).unwrap();
        assert!(matches!(cli.command, Command::Diff { rename_threshold: Some(30), .. }));
        assert!(Cli::try_parse_from(["gv", "diff", "--rename-threshold", "101"]).is_err());
    }

    #[test]
    fn rebase_requires_upstream_unless_resuming() {
        assert!(Cli::try_parse_from(["gv", "rebase"]).is_err());
        assert!(Cli::try_parse_from(["gv", "rebase", "--continue"]).is_ok());
        assert!(Cli::try_parse_from(["gv", "rebase", "--abort", "--skip"]).is_err());
    }
}
