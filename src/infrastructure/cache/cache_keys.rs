use crate::core::models::group::GroupId;

pub fn group_snapshot_key(group_id: GroupId) -> String {
    format!("group_snapshot:{}", group_id)
}
