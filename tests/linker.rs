use reglink::bytecode::{Opcode, ProgramBuilder};
use reglink::graph::{Graph, NodeKind};
use reglink::{link_program, LinkError, MalformedProgram};

//The program an external compiler would produce for `a|b`: one branch over
//two literals, both flowing into a shared end.
fn alternation() -> Vec<u8> {
    let mut builder = ProgramBuilder::new();

    let branch = builder.push(Opcode::Branch, None);
    let lit_a = builder.push(Opcode::Exactly, Some("a"));
    let back_a = builder.push(Opcode::Back, None);
    let lit_b = builder.push(Opcode::Exactly, Some("b"));
    let back_b = builder.push(Opcode::Back, None);
    let end = builder.push(Opcode::End, None);

    builder.set_next(branch, lit_a);
    builder.set_alt(branch, lit_b);
    builder.set_next(lit_a, back_a);
    builder.set_next(back_a, end);
    builder.set_next(lit_b, back_b);
    builder.set_next(back_b, end);

    builder.build()
}

//The shape of `(a|b)+`: an outer repeat whose alt edge re-enters an inner
//branch over two open/literal/close paths, each looping back to the repeat.
fn repeated_group() -> Vec<u8> {
    let mut builder = ProgramBuilder::new();

    let plus = builder.push(Opcode::Plus, None);
    let branch = builder.push(Opcode::Branch, None);
    let open_a = builder.push_group(Opcode::Open, 1);
    let lit_a = builder.push(Opcode::Exactly, Some("a"));
    let close_a = builder.push_group(Opcode::Close, 1);
    let open_b = builder.push_group(Opcode::Open, 1);
    let lit_b = builder.push(Opcode::Exactly, Some("b"));
    let close_b = builder.push_group(Opcode::Close, 1);
    let end = builder.push(Opcode::End, None);

    builder.set_next(plus, end); // forward reference, resolved last
    builder.set_alt(plus, branch);
    builder.set_next(branch, open_a);
    builder.set_alt(branch, open_b);
    builder.set_next(open_a, lit_a);
    builder.set_next(lit_a, close_a);
    builder.set_next(close_a, plus); // backward jump into the loop head
    builder.set_next(open_b, lit_b);
    builder.set_next(lit_b, close_b);
    builder.set_next(close_b, plus);

    builder.build()
}

fn assert_edge_totality(graph: &Graph) {
    for node in graph.nodes() {
        match &node.kind {
            NodeKind::End => {
                assert_eq!(node.next, None, "End at {} has a next edge", node.location);
                assert_eq!(node.alt, None);
            }
            kind if kind.has_alt() => {
                assert!(node.next.is_some(), "{:?} at {} lacks next", kind, node.location);
                assert!(node.alt.is_some(), "{:?} at {} lacks alt", kind, node.location);
            }
            kind => {
                assert!(node.next.is_some(), "{:?} at {} lacks next", kind, node.location);
                assert_eq!(node.alt, None);
            }
        }
    }
}

#[test]
fn alternation_links_into_one_branch_two_literals_one_end() {
    let graph = link_program(&alternation()).unwrap();

    assert_edge_totality(&graph);

    let entry = graph.entry();
    assert!(matches!(entry.kind, NodeKind::Branch));
    assert_eq!(entry.location, 1);

    let branches = graph
        .nodes()
        .iter()
        .filter(|node| matches!(node.kind, NodeKind::Branch))
        .count();
    assert_eq!(branches, 1);

    let mut operands: Vec<&str> = graph
        .nodes()
        .iter()
        .filter(|node| matches!(node.kind, NodeKind::Literal))
        .map(|node| node.operand.as_deref().unwrap())
        .collect();
    operands.sort_unstable();
    assert_eq!(operands, vec!["a", "b"]);

    //Both alternatives flow into the same End node
    let via_next = follow_to_end(&graph, entry.next.unwrap());
    let via_alt = follow_to_end(&graph, entry.alt.unwrap());
    assert_eq!(via_next, via_alt);

    let ends = graph
        .nodes()
        .iter()
        .filter(|node| matches!(node.kind, NodeKind::End))
        .count();
    assert_eq!(ends, 1);
}

fn follow_to_end(graph: &Graph, mut id: usize) -> usize {
    loop {
        let node = graph.node(id).unwrap();
        match node.next {
            Some(next) => id = next,
            None => return node.id,
        }
    }
}

#[test]
fn repeated_group_loops_back_through_the_repeat_head() {
    let graph = link_program(&repeated_group()).unwrap();

    assert_edge_totality(&graph);
    assert_eq!(graph.len(), 9);

    let head = graph.entry();
    assert!(matches!(head.kind, NodeKind::Plus));

    let branch = graph.node(head.alt.unwrap()).unwrap();
    assert!(matches!(branch.kind, NodeKind::Branch));

    //Each alternative runs open -> literal -> close and jumps back to the head
    for start in [branch.next.unwrap(), branch.alt.unwrap()].iter() {
        let open = graph.node(*start).unwrap();
        assert!(matches!(open.kind, NodeKind::GroupOpen(1)));

        let literal = graph.node(open.next.unwrap()).unwrap();
        assert!(matches!(literal.kind, NodeKind::Literal));

        let close = graph.node(literal.next.unwrap()).unwrap();
        assert!(matches!(close.kind, NodeKind::GroupClose(1)));

        assert_eq!(close.next, Some(head.id));
    }

    assert!(matches!(
        graph.node(head.next.unwrap()).unwrap().kind,
        NodeKind::End
    ));

    //Every node has been created once, so the walk emits one triple per
    //outgoing edge and terminates despite the cycle
    assert_eq!(graph.traverse().count(), 10);

    let into_head = graph
        .traverse()
        .filter(|(_, _, to)| to.id == head.id)
        .count();
    assert_eq!(into_head, 2);
}

#[test]
fn relinking_yields_an_isomorphic_graph() {
    let bytes = repeated_group();

    let first = link_program(&bytes).unwrap();
    let second = link_program(&bytes).unwrap();

    assert_eq!(first.len(), second.len());
    assert_eq!(first.entry().location, second.entry().location);

    for node in first.nodes() {
        let twin = second.get(node.location).unwrap();

        assert_eq!(&node.kind, &twin.kind);
        assert_eq!(&node.operand, &twin.operand);
        assert_eq!(
            node.next.map(|id| first.location_of(id).unwrap()),
            twin.next.map(|id| second.location_of(id).unwrap())
        );
        assert_eq!(
            node.alt.map(|id| first.location_of(id).unwrap()),
            twin.alt.map(|id| second.location_of(id).unwrap())
        );
    }
}

#[test]
fn single_character_repetition_is_a_bounded_self_loop() {
    let mut builder = ProgramBuilder::new();
    let star = builder.push(Opcode::Star, None);
    let end = builder.push(Opcode::End, None);
    builder.set_next(star, end);
    builder.set_alt(star, star);

    let graph = link_program(&builder.build()).unwrap();

    let entry = graph.entry();
    assert!(matches!(entry.kind, NodeKind::Star));

    //Re-entering the loop lands on the very same node, however deep we go
    let mut node = entry;
    for _ in 0..3 {
        node = graph.node(node.alt.unwrap()).unwrap();
        assert_eq!(node.id, entry.id);
    }

    //The visited set cuts the cycle: one next edge, one alt edge, done
    assert_eq!(graph.traverse().count(), 2);
}

#[test]
fn every_truncation_of_a_valid_program_fails_to_link() {
    let bytes = alternation();

    assert!(link_program(&bytes).is_ok());

    for cut in 0..bytes.len() {
        assert!(
            link_program(&bytes[..cut]).is_err(),
            "a {}-byte prefix linked successfully",
            cut
        );
    }
}

#[test]
fn a_forward_offset_past_the_scanned_range_is_malformed() {
    let mut builder = ProgramBuilder::new();
    let literal = builder.push(Opcode::Exactly, Some("a"));
    builder.push(Opcode::End, None);
    builder.set_next(literal, 500); // past everything the scan will reach

    let err = link_program(&builder.build()).unwrap_err();

    assert!(matches!(
        err,
        LinkError::MalformedProgram(MalformedProgram::DanglingReference(500))
    ));
}
