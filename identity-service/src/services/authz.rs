/// Role-threshold decision: granted when any held role meets the required
/// level. A level of zero or below only requires authentication.
pub fn authorize(roles: &[i32], required_level: i32) -> bool {
    if required_level <= 0 {
        return true;
    }
    roles.iter().any(|role| *role >= required_level)
}
