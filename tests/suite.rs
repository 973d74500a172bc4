use std::{fs::File, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use verdict::{compile, Options};

#[derive(Debug, Serialize, Deserialize)]
struct Group {
    description: String,
    schema: Value,
    tests: Vec<Test>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Test {
    description: String,
    data: Value,
    valid: bool,
}

#[test]
fn test_suite() {
    run_file("type.json");
    run_file("enum.json");
    run_file("numbers.json");
    run_file("strings.json");
    run_file("format.json");
    run_file("items.json");
    run_file("properties.json");
    run_file("required.json");
    run_file("dependencies.json");
    run_file("combinators.json");
    run_file("ref.json");
}

fn run_file(path: &str) {
    let suite = Path::new("tests/suite/");
    let file = File::open(suite.join(path)).unwrap();

    let groups: Vec<Group> = serde_json::from_reader(file).unwrap();
    for group in groups {
        println!("{}", group.description);
        let validator = compile([group.schema], Options::default()).unwrap();
        for mut test in group.tests {
            println!("    {}", test.description);
            let report = validator.validate(&mut test.data, "0").unwrap();
            if !report.valid {
                println!("        {report:#}");
            }
            assert_eq!(report.valid, test.valid, "{path}: {}", test.description);
        }
    }
}
