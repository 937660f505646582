//! End-to-end pipeline tests: source text through scanner, compiler, program
//! file, and executor, asserting the resulting on-disk state.

use std::path::{Path, PathBuf};

use flatdb::executor::Executor;
use flatdb::lang::parser;
use flatdb::lang::Program;
use flatdb::storage::files;

const DECLARATIONS: &str = "schema : University\n\
                            using : University\n\
                            relation : Student\n\
                            Student -> {id, int, PK}, {name, varchar(20), NOT NULL}\n";

/// Compile `source` and write the program file; panics on compile errors.
fn build(dir: &Path, name: &str, source: &str) -> PathBuf {
    let source_path = dir.join(format!("{}.fql", name));
    std::fs::write(&source_path, source).unwrap();

    let result = parser::compile_source_file(&source_path).unwrap();
    assert!(
        !result.diagnostics.has_errors(),
        "unexpected compile errors: {:?}",
        result.diagnostics.entries()
    );

    let program_path = dir.join(name);
    result.program.unwrap().store(&program_path).unwrap();
    program_path
}

fn run(db_root: &Path, program_path: &Path) -> Executor {
    let mut executor = Executor::new(db_root);
    executor.execute_file(program_path).unwrap();
    executor
}

fn student_rows(db_root: &Path) -> Vec<String> {
    files::read_all_lines(db_root.join("University/relations/Student")).unwrap()
}

fn rid_counter(db_root: &Path) -> Vec<String> {
    files::read_all_lines(db_root.join("University/currentRID")).unwrap()
}

#[test]
fn scenario_a_duplicate_add_keeps_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("DB");

    let source = format!(
        "{}Student.add(1, \"Alice\")\nStudent.add(1, \"Bob\")\n",
        DECLARATIONS
    );
    let program = build(dir.path(), "a", &source);
    run(&db, &program);

    assert_eq!(student_rows(&db), vec!["RID,id,name", "0,1,Alice"]);
    assert_eq!(rid_counter(&db), vec!["Student:1"]);
}

#[test]
fn scenario_b_update_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("DB");

    let setup = format!("{}Student.add(1, \"Alice\")\n", DECLARATIONS);
    run(&db, &build(dir.path(), "setup", &setup));

    // Second build and run, as a separate process would do it.
    let update = format!(
        "{}Student.update() where {{ id == 1 }} set {{ name = \"Carol\" }}\n",
        DECLARATIONS
    );
    run(&db, &build(dir.path(), "update", &update));

    // RID unchanged, field rewritten in place.
    assert_eq!(student_rows(&db), vec!["RID,id,name", "0,1,Carol"]);
    assert_eq!(rid_counter(&db), vec!["Student:1"]);
}

#[test]
fn scenario_c_delete_frees_the_key() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("DB");

    let setup = format!("{}Student.add(1, \"Carol\")\n", DECLARATIONS);
    run(&db, &build(dir.path(), "setup", &setup));

    let delete_and_readd = format!(
        "{}Student.delete() where {{ id == 1 }}\nStudent.add(1, \"Dana\")\n",
        DECLARATIONS
    );
    run(&db, &build(dir.path(), "readd", &delete_and_readd));

    // The key is reusable after the delete, and the RID keeps counting up.
    assert_eq!(student_rows(&db), vec!["RID,id,name", "1,1,Dana"]);
    assert_eq!(rid_counter(&db), vec!["Student:2"]);
}

#[test]
fn scenario_d_fetch_filtered_column() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("DB");

    let setup = format!(
        "{}Student.add(1, \"Carol\")\nStudent.add(2, \"Bob\")\n",
        DECLARATIONS
    );
    run(&db, &build(dir.path(), "setup", &setup));

    let fetch = format!(
        "{}let arr = Student.fetch(name) where {{ id == 1 }}\nshow : arr\n",
        DECLARATIONS
    );
    let executor = run(&db, &build(dir.path(), "fetch", &fetch));

    assert_eq!(executor.array("arr").unwrap(), &[vec!["Carol".to_string()]]);
}

#[test]
fn rid_counter_accumulates_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("DB");

    let first = format!(
        "{}Student.add(1, \"A\")\nStudent.add(2, \"B\")\n",
        DECLARATIONS
    );
    run(&db, &build(dir.path(), "first", &first));
    assert_eq!(rid_counter(&db), vec!["Student:2"]);

    let second = format!("{}Student.add(3, \"C\")\n", DECLARATIONS);
    run(&db, &build(dir.path(), "second", &second));

    assert_eq!(
        student_rows(&db),
        vec!["RID,id,name", "0,1,A", "1,2,B", "2,3,C"]
    );
    assert_eq!(rid_counter(&db), vec!["Student:3"]);
}

#[test]
fn build_failure_emits_no_program() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("broken.fql");
    std::fs::write(
        &source_path,
        "schema : S\nschema : S\nusing : Missing\nrelation : R\n",
    )
    .unwrap();

    let result = parser::compile_source_file(&source_path).unwrap();
    assert!(result.program.is_none());
    assert_eq!(result.diagnostics.error_count(), 3);

    // Diagnostics carry the original source lines.
    assert!(result
        .diagnostics
        .errors()
        .all(|d| d.source.is_some()));
}

#[test]
fn include_splices_shared_declarations() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("DB");

    std::fs::write(dir.path().join("decl.fql"), DECLARATIONS).unwrap();
    let source = "include : decl.fql\nStudent.add(1, \"Alice\")\n";
    let program = build(dir.path(), "main", source);
    run(&db, &program);

    assert_eq!(student_rows(&db), vec!["RID,id,name", "0,1,Alice"]);
}

#[test]
fn program_file_round_trips_exactly() {
    let dir = tempfile::tempdir().unwrap();

    let source = format!(
        "{}Student.add(1, \"Alice\")\n\
         Student.update() where {{ id == 1 }} set {{ name = \"Z\" }}\n\
         let arr = Student.fetch(name)\nshow : arr\n",
        DECLARATIONS
    );
    let program_path = build(dir.path(), "rt", &source);

    let stored_lines = files::read_all_lines(&program_path).unwrap();
    let reloaded = Program::load(&program_path).unwrap();
    let reserialized: Vec<String> = reloaded
        .instructions()
        .iter()
        .map(|i| i.to_string())
        .collect();

    assert_eq!(stored_lines, reserialized);
}

#[test]
fn predicates_with_boolean_and_date_attributes() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("DB");

    let source = "schema : S\nusing : S\nrelation : Event\n\
                  Event -> {id, int, PK}, {active, boolean, NULLABLE}, {day, date, NULLABLE}\n\
                  Event.add(1, true, \"2024-06-01\")\n\
                  Event.add(2, false, \"2024-06-02\")\n\
                  Event.delete() where { active == false }\n";
    run(&db, &build(dir.path(), "events", source));

    let rows = files::read_all_lines(db.join("S/relations/Event")).unwrap();
    assert_eq!(rows, vec!["RID,id,active,day", "0,1,true,2024-06-01"]);
}
