/// Stable sort, largest key first; equal keys keep their input order.
pub fn sort_by_key_ref_desc<T, B, F>(slice: &mut [T], mut f: F)
where
    F: FnMut(&T) -> &B,
    B: Ord,
{
    slice.sort_by(|a, b| f(b).cmp(f(a)))
}
