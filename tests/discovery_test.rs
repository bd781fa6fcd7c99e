/// Tests for registry discovery against an in-memory registry
#[cfg(test)]
mod discovery_tests {
    use anyhow::Result;
    use regmigrate::registry::{discover, DiscoveryOptions, RegistrySource};
    use regmigrate::skip::{SkipList, TagSkipPolicy};
    use regmigrate::{LayerRecord, MigrationPlanner};
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[derive(Default)]
    struct FakeRegistry {
        tags: Vec<(String, Vec<String>)>,
        layers: HashMap<String, Vec<LayerRecord>>,
    }

    impl FakeRegistry {
        fn with_image(mut self, name: &str, tags: &[(&str, Vec<LayerRecord>)]) -> Self {
            self.tags.push((
                name.to_string(),
                tags.iter().map(|(t, _)| t.to_string()).collect(),
            ));
            for (tag, records) in tags {
                self.layers
                    .insert(format!("{}:{}", name, tag), records.clone());
            }
            self
        }
    }

    impl RegistrySource for FakeRegistry {
        fn list_images(&self) -> Result<Vec<String>> {
            Ok(self.tags.iter().map(|(name, _)| name.clone()).collect())
        }

        fn list_tags(&self, name: &str) -> Result<Vec<String>> {
            Ok(self
                .tags
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, tags)| tags.clone())
                .unwrap_or_default())
        }

        fn list_tag_layers(&self, name: &str, tag: &str) -> Result<Vec<LayerRecord>> {
            self.layers
                .get(&format!("{}:{}", name, tag))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("manifest unknown: {}:{}", name, tag))
        }
    }

    fn layers(list: &[(&str, u64)]) -> Vec<LayerRecord> {
        list.iter().map(|(d, s)| LayerRecord::new(d, *s)).collect()
    }

    fn registry() -> FakeRegistry {
        FakeRegistry::default()
            .with_image(
                "team/app",
                &[
                    ("1", layers(&[("base", 100), ("app1", 10)])),
                    ("2", layers(&[("base", 100), ("app2", 12)])),
                    ("3", layers(&[("base", 100), ("app3", 14)])),
                ],
            )
            .with_image("team/empty", &[])
            .with_image("legacy/db", &[("9", layers(&[("base", 100), ("db", 500)]))])
    }

    fn options(tag_skip: TagSkipPolicy) -> DiscoveryOptions {
        DiscoveryOptions {
            tag_skip,
            progress: false,
        }
    }

    #[test]
    fn test_discovers_all_tags_in_listing_order() {
        let source = registry();
        let names = source.list_images().unwrap();
        let graph = discover(&source, &names, &SkipList::empty(), options(TagSkipPolicy::SkipTag))
            .unwrap();

        let found: Vec<String> = graph.images().map(|i| i.full_name()).collect();
        assert_eq!(found, vec!["team/app:1", "team/app:2", "team/app:3", "legacy/db:9"]);
        assert_eq!(graph.shared_bytes("team/app:1", "legacy/db:9").unwrap(), 100);
    }

    #[test]
    fn test_image_and_tag_skips() {
        let source = registry();
        let names = source.list_images().unwrap();
        let skip = SkipList::parse("legacy/db\nteam/app:2\n");

        let graph = discover(&source, &names, &skip, options(TagSkipPolicy::SkipTag)).unwrap();
        let found: Vec<String> = graph.images().map(|i| i.full_name()).collect();
        assert_eq!(found, vec!["team/app:1", "team/app:3"]);

        let graph = discover(
            &source,
            &names,
            &skip,
            options(TagSkipPolicy::AbandonRemainingTags),
        )
        .unwrap();
        let found: Vec<String> = graph.images().map(|i| i.full_name()).collect();
        assert_eq!(found, vec!["team/app:1"]);
    }

    #[test]
    fn test_skip_list_from_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "# do not migrate").unwrap();
        writeln!(file, "team/app").unwrap();
        let skip = SkipList::from_file(file.path()).unwrap();

        let source = registry();
        let names = source.list_images().unwrap();
        let graph = discover(&source, &names, &skip, options(TagSkipPolicy::SkipTag)).unwrap();
        assert_eq!(graph.len(), 1);

        let plan = MigrationPlanner::new(&graph)
            .with_skip(skip.as_visited_set())
            .plan()
            .unwrap();
        assert_eq!(plan.order, vec!["legacy/db:9"]);
    }

    #[test]
    fn test_malformed_layer_record_fails_discovery() {
        let bad = LayerRecord {
            digest: Some("sha256:bad".to_string()),
            size: Some(serde_json::json!(-1)),
        };
        let source = FakeRegistry::default().with_image("team/bad", &[("1", vec![bad])]);
        let names = vec!["team/bad".to_string()];

        let err = discover(&source, &names, &SkipList::empty(), options(TagSkipPolicy::SkipTag))
            .unwrap_err();
        assert!(err.to_string().contains("team/bad:1"));
    }

    #[test]
    fn test_missing_manifest_propagates() {
        let mut source = registry();
        source.layers.remove("team/app:2");
        let names = vec!["team/app".to_string()];

        let err = discover(&source, &names, &SkipList::empty(), options(TagSkipPolicy::SkipTag))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("team/app:2"));
    }
}
