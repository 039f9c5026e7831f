//! End-to-end: dump text -> row store -> tree index -> queries -> triples -> archive.

use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, Read};
use taxtree_core::{DumpReader, NameClass};
use taxtree_graph::{
    ImportConfig, ImportOutcome, Importer, LoadError, Page, QueryService, RowStore, Taxonomy,
    TreeError,
};
use taxtree_rdf::vocab::{rdfs, taxon_iri};
use taxtree_rdf::{
    export_archive, write_turtle, ArchiveManifest, ExportConfig, Term, Triple, TripleEmitter,
    MANIFEST_NAME,
};
use tempfile::tempdir;

fn node_line(id: u32, parent: u32, rank: &str) -> String {
    format!(
        "{}\t|\t{}\t|\t{}\t|\t\t|\t0\t|\t0\t|\t1\t|\t0\t|\t0\t|\t0\t|\t0\t|\t0\t|\t\t|\n",
        id, parent, rank
    )
}

fn name_line(id: u32, name: &str, class: &str) -> String {
    format!("{}\t|\t{}\t|\t\t|\t{}\t|\n", id, name, class)
}

fn scenario_dump() -> (String, String) {
    let nodes = [
        node_line(1, 1, "root"),
        node_line(2, 1, "genus"),
        node_line(3, 2, "species"),
    ]
    .concat();
    let names = name_line(3, "Homo sapiens", "scientific name");
    (nodes, names)
}

fn import(importer: &Importer, nodes: &str, names: &str, force: bool) -> ImportOutcome {
    let options = importer.parse_options();
    let nodes = DumpReader::new(Cursor::new(nodes.as_bytes().to_vec()), "nodes.dmp", options);
    let names = DumpReader::new(Cursor::new(names.as_bytes().to_vec()), "names.dmp", options);
    importer.run_readers(nodes, names, force).unwrap()
}

fn turtle(taxonomy: &Taxonomy) -> String {
    let config = ExportConfig::default();
    let emitter = TripleEmitter::for_taxonomy(taxonomy, &config);
    let mut out = Vec::new();
    write_turtle(&mut out, emitter.emit()).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_scenario_end_to_end() {
    let (nodes, names) = scenario_dump();
    let importer = Importer::new(RowStore::temporary().unwrap(), ImportConfig::default());
    import(&importer, &nodes, &names, false);

    let service = QueryService::from_store(importer.store()).unwrap();
    let lineage: Vec<u32> = service.lineage(3).unwrap().iter().map(|n| n.id).collect();
    assert_eq!(lineage, vec![3, 2, 1]);
    let children: Vec<u32> = service.children(1).unwrap().iter().map(|n| n.id).collect();
    assert_eq!(children, vec![2]);
    let descendants: Vec<u32> = service
        .descendants(1, None, Page::unbounded(), None)
        .unwrap()
        .items
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(descendants, vec![2, 3]);

    let taxonomy = Taxonomy::load(importer.store()).unwrap();
    let config = ExportConfig::default();
    let emitter = TripleEmitter::for_taxonomy(&taxonomy, &config);
    let triples: Vec<Triple> = emitter.emit().collect();

    let sub_class: Vec<(String, Term)> = triples
        .iter()
        .filter(|t| t.predicate == rdfs::SUB_CLASS_OF)
        .map(|t| (t.subject.clone(), t.object.clone()))
        .collect();
    assert_eq!(
        sub_class,
        vec![
            (taxon_iri(2), Term::iri(taxon_iri(1))),
            (taxon_iri(3), Term::iri(taxon_iri(2))),
        ]
    );

    let labels: Vec<&Triple> = triples
        .iter()
        .filter(|t| t.predicate == rdfs::LABEL)
        .collect();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].subject, taxon_iri(3));
}

#[test]
fn test_reimport_keeps_store_and_topology() {
    let (nodes, names) = scenario_dump();
    let importer = Importer::new(RowStore::temporary().unwrap(), ImportConfig::default());

    import(&importer, &nodes, &names, false);
    let first = Taxonomy::load(importer.store()).unwrap();
    let counts = (importer.store().node_count(), importer.store().name_count());

    import(&importer, &nodes, &names, true);
    let second = Taxonomy::load(importer.store()).unwrap();
    assert_eq!(
        (importer.store().node_count(), importer.store().name_count()),
        counts
    );

    let order = |t: &Taxonomy| t.tree.preorder().map(|n| n.id).collect::<Vec<_>>();
    assert_eq!(order(&first), order(&second));
}

#[test]
fn test_export_is_deterministic_and_duplicate_free() {
    let nodes = [
        node_line(1, 1, "no rank"),
        node_line(2, 1, "genus"),
        node_line(3, 2, "species"),
        node_line(4, 2, "species"),
    ]
    .concat();
    let names = [
        name_line(2, "Homo", "scientific name"),
        name_line(3, "Homo sapiens", "scientific name"),
        name_line(3, "human", "common name"),
        name_line(3, "human", "genbank common name"),
        name_line(4, "Homo erectus", "scientific name"),
        name_line(4, "Pithecanthropus erectus", "synonym"),
        name_line(4, "erectus", "nickname"),
    ]
    .concat();
    let importer = Importer::new(RowStore::temporary().unwrap(), ImportConfig::default());
    import(&importer, &nodes, &names, false);
    let taxonomy = Taxonomy::load(importer.store()).unwrap();

    let first = turtle(&taxonomy);
    let second = turtle(&taxonomy);
    assert_eq!(first, second);

    let lines: Vec<&str> = first.lines().collect();
    let unique: HashSet<&str> = lines.iter().copied().collect();
    assert_eq!(unique.len(), lines.len());

    let dir = tempdir().unwrap();
    let path = dir.path().join("taxtree.zip");
    let config = ExportConfig::default();
    let emitter = TripleEmitter::for_taxonomy(&taxonomy, &config);
    let manifest = export_archive(&path, &emitter, &config).unwrap();
    assert_eq!(manifest.report.triples, lines.len() as u64);
    assert_eq!(manifest.report.duplicates_dropped, 1);
    assert_eq!(manifest.report.fallback_predicates, 1);

    let mut archive = zip::ZipArchive::new(fs::File::open(&path).unwrap()).unwrap();
    let mut batch = String::new();
    archive
        .by_name(&manifest.batches[0])
        .unwrap()
        .read_to_string(&mut batch)
        .unwrap();
    assert_eq!(batch, first);

    let mut raw = String::new();
    archive
        .by_name(MANIFEST_NAME)
        .unwrap()
        .read_to_string(&mut raw)
        .unwrap();
    let stored: ArchiveManifest = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored.report, manifest.report);
}

#[test]
fn test_scoped_name_search() {
    let nodes = [
        node_line(1, 1, "no rank"),
        node_line(2, 1, "family"),
        node_line(3, 2, "species"),
        node_line(4, 1, "family"),
        node_line(5, 4, "species"),
    ]
    .concat();
    let names = [
        name_line(3, "Felis catus", "scientific name"),
        name_line(5, "Felis domestica", "synonym"),
    ]
    .concat();
    let importer = Importer::new(RowStore::temporary().unwrap(), ImportConfig::default());
    import(&importer, &nodes, &names, false);
    let service = QueryService::from_store(importer.store()).unwrap();

    let everywhere = service
        .find_by_name("felis%", None, None, Page::default())
        .unwrap();
    assert_eq!(everywhere.total, Some(2));

    let scoped = service
        .descendants_named(4, "felis%", None, Page::default())
        .unwrap();
    assert_eq!(scoped.items.len(), 1);
    assert_eq!(scoped.items[0].id, 5);

    let synonyms = service
        .find_by_name("%catus", Some(&NameClass::Synonym), None, Page::default())
        .unwrap();
    assert!(synonyms.items.is_empty());
}

#[test]
fn test_broken_hierarchy_fails_load_but_keeps_previous_snapshot() {
    let (nodes, names) = scenario_dump();
    let store = RowStore::temporary().unwrap();
    let importer = Importer::new(store.clone(), ImportConfig::default());
    import(&importer, &nodes, &names, false);
    let service = QueryService::from_store(&store).unwrap();

    let broken = [nodes.clone(), node_line(9, 999, "species")].concat();
    import(&importer, &broken, &names, true);

    let err = service.refresh(&store).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Tree(TreeError::OrphanNode {
            child: 9,
            missing_parent: 999
        })
    ));
    assert!(service.node(3).is_some());
    assert!(service.node(9).is_none());
}
