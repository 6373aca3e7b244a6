//! Property tests for extraction determinism and signature equality

use proptest::prelude::*;

use codegraph::{Extractor, MethodSignature, TypeReference};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The identifier scheme is a pure function of source and path.
    #[test]
    fn prop_extraction_deterministic(name in "[A-Z][a-zA-Z0-9]{0,12}") {
        let extractor = Extractor::new().unwrap();
        let src = format!("package p\n\nfunc {name}(x int) error {{\n\treturn nil\n}}\n");

        let first = extractor.extract_source("p/a.go", &src).unwrap();
        let second = extractor.extract_source("p/a.go", &src).unwrap();

        prop_assert_eq!(&first.functions, &second.functions);
        prop_assert_eq!(first.functions.len(), 1);
        prop_assert_eq!(&first.functions[0].id, &format!("p.{name}"));
        prop_assert_eq!(&first.content_hash, &second.content_hash);
    }

    /// Changing an unrelated file never renumbers surviving entities: the id
    /// depends only on the declaring file's package and the name.
    #[test]
    fn prop_ids_independent_of_siblings(
        name in "[A-Z][a-zA-Z0-9]{0,12}",
        other in "[A-Z][a-zA-Z0-9]{0,12}",
    ) {
        let extractor = Extractor::new().unwrap();
        let src = format!("package p\n\nfunc {name}() {{}}\n");
        let alone = extractor.extract_source("p/a.go", &src).unwrap();

        // A different sibling file's content is irrelevant to a.go's ids
        let sibling = format!("package p\n\nfunc {other}() {{}}\n");
        let _ = extractor.extract_source("p/b.go", &sibling).unwrap();
        let again = extractor.extract_source("p/a.go", &src).unwrap();

        prop_assert_eq!(alone.functions, again.functions);
    }

    /// TypeReference equality requires all five components; flipping any
    /// modifier breaks it.
    #[test]
    fn prop_type_reference_modifiers_distinguish(
        name in "[A-Z][a-zA-Z0-9]{0,12}",
        is_pointer in any::<bool>(),
        is_slice in any::<bool>(),
    ) {
        let base = TypeReference {
            name: name.clone(),
            package_alias: None,
            is_pointer,
            is_slice,
            is_map: false,
        };
        let flipped_pointer = TypeReference { is_pointer: !is_pointer, ..base.clone() };
        let flipped_slice = TypeReference { is_slice: !is_slice, ..base.clone() };

        prop_assert_eq!(&base, &base.clone());
        prop_assert_ne!(&base, &flipped_pointer);
        prop_assert_ne!(&base, &flipped_slice);
    }

    /// Signature equality is positional: any permutation of two distinct
    /// parameter types is detected.
    #[test]
    fn prop_signature_positional(a in "[A-Z][a-z]{1,8}", b in "[A-Z][a-z]{1,8}") {
        prop_assume!(a != b);
        let forward = MethodSignature {
            name: "M".to_string(),
            params: vec![TypeReference::named(a.clone()), TypeReference::named(b.clone())],
            returns: vec![],
        };
        let reversed = MethodSignature {
            name: "M".to_string(),
            params: vec![TypeReference::named(b), TypeReference::named(a)],
            returns: vec![],
        };
        prop_assert_ne!(forward, reversed);
    }
}
