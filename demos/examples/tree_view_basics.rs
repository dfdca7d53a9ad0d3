// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree view basics: lazy expansion, edits, and painting a clipped window.
//!
//! This example drives a `VisibilityCache` over a small file tree and prints
//! what a host would draw after each step.
//!
//! Run:
//! - `RUST_LOG=trace cargo run -p understory_demos --example tree_view_basics`

use std::rc::Rc;

use kurbo::{Point, Rect, Size};
use understory_tree_view::{
    CheckState, HitPart, NodeState, SourceNode, SourceTree, TreeStyle, VisibilityCache,
};

const WIDTH: f64 = 240.0;

/// Fixed-height text rows, 7 pixels per character.
fn measure(data: Option<&Rc<&'static str>>, _: &NodeState) -> Size {
    Size::new(data.map_or(0.0, |name| 7.0 * name.len() as f64), 18.0)
}

fn print_rows(label: &str, cache: &VisibilityCache<Rc<&'static str>>, clip: Rect) {
    println!("\n== {label} ==");
    for row in cache.paint_rows(clip, WIDTH) {
        let control = match row.state.expanded {
            Some(true) => "v ",
            Some(false) => "> ",
            None => "  ",
        };
        let check = match row.state.check_state() {
            CheckState::Checked => "[x] ",
            CheckState::Mixed => "[-] ",
            CheckState::Unchecked => "[ ] ",
        };
        println!(
            "{:>3} y={:>5.1} {}{}{}{}",
            row.row,
            row.row_bounds.y0,
            "    ".repeat(row.state.depth),
            control,
            if row.checkbox.is_some() { check } else { "" },
            row.data,
        );
    }
}

fn main() {
    env_logger::init();

    let mut source = SourceTree::from_nodes([
        SourceNode::leaf("Cargo.toml"),
        SourceNode::branch(
            "src",
            [
                SourceNode::leaf("lib.rs"),
                SourceNode::branch("cache", [SourceNode::leaf("mod.rs")]),
            ],
        )
        .expanded(),
        SourceNode::branch("tests", [SourceNode::leaf("visibility.rs")]),
    ]);

    let style = TreeStyle::default()
        .with_checkmarks(true)
        .with_mixed_checkmark_state(true);
    let mut cache = VisibilityCache::new(style);
    if let Err(err) = cache.attach(&source) {
        log::error!("attach failed: {err}");
        return;
    }
    let height = cache.measure_node_height(&mut measure);
    log::info!("row height {height}, {} rows", cache.visible_len());
    let everything = Rect::new(0.0, 0.0, WIDTH, cache.content_height());
    print_rows("attached (src starts expanded)", &cache, everything);

    // A click on the branch control of "tests" expands it.
    let click = Point::new(4.0, cache.row_y(4) + 2.0);
    if let Some(hit) = cache.hit_test(click, WIDTH)
        && hit.part == HitPart::BranchControl
        && let Ok(path) = cache.path_of(hit.node)
    {
        cache.toggle(&source, &path).expect("path came from the cache");
    }

    // Check a file deep under "src"; its ancestors turn mixed.
    let file = cache
        .locate(&source, &[1, 1, 0])
        .expect("src/cache/mod.rs exists");
    cache.set_checked(file, true).expect("live handle");
    cache.expand(&source, &[1, 1]).expect("src/cache is a branch");
    let everything = Rect::new(0.0, 0.0, WIDTH, cache.content_height());
    print_rows("expanded tests and src/cache", &cache, everything);

    // Edits are forwarded as the changes the source returns.
    let change = source
        .insert(&[1], 0, SourceNode::leaf("build.rs"))
        .expect("src exists");
    cache.apply(&source, &change).expect("in sync");
    let change = source.remove(&[], 0, 1).expect("top level is not empty");
    cache.apply(&source, &change).expect("in sync");

    // Only the rows inside the clip are produced.
    let extent = cache.row_extent();
    let window = Rect::new(0.0, 2.0 * extent, WIDTH, 5.0 * extent);
    print_rows("window of three rows after edits", &cache, window);

    let mut renderer = measure;
    println!(
        "\npreferred size: {:?}",
        cache.preferred_size(&mut renderer)
    );
}
