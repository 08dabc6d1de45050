use uuid::Uuid;

pub fn uuid_v5(ns: Uuid, name: &str) -> Uuid {
    Uuid::new_v5(&ns, name.as_bytes())
}

/// Stable node id derived from the label and natural key, so every run and
/// every retry lands on the same store row. Name looks like
/// "Person|key=p-00042".
pub fn stable_node_id(label: &str, key: &str) -> Uuid {
    let name = format!("{}|key={}", label, key);
    uuid_v5(Uuid::NAMESPACE_OID, &name)
}

/// Stable edge id from the type label and both endpoint node ids.
pub fn stable_edge_id(rel_type: &str, from: &Uuid, to: &Uuid) -> Uuid {
    let name = format!("{}|{}|{}", rel_type, from, to);
    uuid_v5(Uuid::NAMESPACE_OID, &name)
}
