use crate::common::{PageId, PAGE_SIZE};

const NUM_RECORDS_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

const NAME_SIZE: usize = 32;
const RECORD_SIZE: usize = NAME_SIZE + 4; // name + root page id

const MAX_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// Read-write view of the header page (page 0).
///
/// The header page is the bootstrap point of the system: it stores one
/// record per named index mapping `index_name -> root_page_id`. Names are
/// at most 32 bytes, null padded. A zero-filled page is a valid empty
/// header.
pub struct HeaderPageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPageMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
    }

    pub fn num_records(&self) -> usize {
        read_num_records(self.data)
    }

    fn set_num_records(&mut self, num: usize) {
        self.data[NUM_RECORDS_OFFSET..NUM_RECORDS_OFFSET + 4]
            .copy_from_slice(&(num as u32).to_le_bytes());
    }

    /// Adds a `name -> root` record. Fails on a duplicate name, an
    /// over-long name, or a full page.
    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        if name.len() > NAME_SIZE || name.is_empty() {
            return false;
        }
        if find_record(self.data, name).is_some() {
            return false;
        }
        let count = self.num_records();
        if count >= MAX_RECORDS {
            return false;
        }

        let offset = record_offset(count);
        self.data[offset..offset + NAME_SIZE].fill(0);
        self.data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
        self.data[offset + NAME_SIZE..offset + RECORD_SIZE]
            .copy_from_slice(&root_page_id.as_i32().to_le_bytes());
        self.set_num_records(count + 1);
        true
    }

    /// Rewrites the root page id of an existing record. Fails if the name
    /// is not present.
    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        let Some(index) = find_record(self.data, name) else {
            return false;
        };
        let offset = record_offset(index);
        self.data[offset + NAME_SIZE..offset + RECORD_SIZE]
            .copy_from_slice(&root_page_id.as_i32().to_le_bytes());
        true
    }

    /// Drops a record, compacting the tail over it.
    pub fn delete_record(&mut self, name: &str) -> bool {
        let Some(index) = find_record(self.data, name) else {
            return false;
        };
        let count = self.num_records();
        let start = record_offset(index);
        let end = record_offset(count);
        self.data.copy_within(start + RECORD_SIZE..end, start);
        self.set_num_records(count - 1);
        true
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        read_root_id(self.data, name)
    }
}

/// Read-only view of the header page.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn num_records(&self) -> usize {
        read_num_records(self.data)
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        read_root_id(self.data, name)
    }
}

fn record_offset(index: usize) -> usize {
    RECORDS_OFFSET + index * RECORD_SIZE
}

fn read_num_records(data: &[u8]) -> usize {
    u32::from_le_bytes(
        data[NUM_RECORDS_OFFSET..NUM_RECORDS_OFFSET + 4]
            .try_into()
            .unwrap(),
    ) as usize
}

fn find_record(data: &[u8], name: &str) -> Option<usize> {
    let name_bytes = name.as_bytes();
    if name_bytes.len() > NAME_SIZE {
        return None;
    }
    (0..read_num_records(data)).find(|&i| {
        let offset = record_offset(i);
        let stored = &data[offset..offset + NAME_SIZE];
        &stored[..name_bytes.len()] == name_bytes
            && stored[name_bytes.len()..].iter().all(|b| *b == 0)
    })
}

fn read_root_id(data: &[u8], name: &str) -> Option<PageId> {
    find_record(data, name).map(|i| {
        let offset = record_offset(i) + NAME_SIZE;
        PageId::new(i32::from_le_bytes(
            data[offset..offset + 4].try_into().unwrap(),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_page_empty() {
        let data = [0u8; PAGE_SIZE];
        let page = HeaderPageRef::new(&data);
        assert_eq!(page.num_records(), 0);
        assert_eq!(page.get_root_id("idx"), None);
    }

    #[test]
    fn test_header_page_insert_get() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPageMut::new(&mut data);

        assert!(page.insert_record("primary", PageId::new(5)));
        assert!(page.insert_record("secondary", PageId::new(9)));
        assert_eq!(page.num_records(), 2);
        assert_eq!(page.get_root_id("primary"), Some(PageId::new(5)));
        assert_eq!(page.get_root_id("secondary"), Some(PageId::new(9)));
        assert_eq!(page.get_root_id("missing"), None);
    }

    #[test]
    fn test_header_page_duplicate_insert_fails() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPageMut::new(&mut data);

        assert!(page.insert_record("idx", PageId::new(1)));
        assert!(!page.insert_record("idx", PageId::new(2)));
        assert_eq!(page.get_root_id("idx"), Some(PageId::new(1)));
    }

    #[test]
    fn test_header_page_update() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPageMut::new(&mut data);

        assert!(!page.update_record("idx", PageId::new(2)));
        page.insert_record("idx", PageId::new(1));
        assert!(page.update_record("idx", PageId::new(2)));
        assert_eq!(page.get_root_id("idx"), Some(PageId::new(2)));
    }

    #[test]
    fn test_header_page_delete() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPageMut::new(&mut data);

        page.insert_record("a", PageId::new(1));
        page.insert_record("b", PageId::new(2));
        page.insert_record("c", PageId::new(3));

        assert!(page.delete_record("b"));
        assert!(!page.delete_record("b"));
        assert_eq!(page.num_records(), 2);
        assert_eq!(page.get_root_id("a"), Some(PageId::new(1)));
        assert_eq!(page.get_root_id("c"), Some(PageId::new(3)));
    }

    #[test]
    fn test_header_page_name_prefix_not_confused() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPageMut::new(&mut data);

        page.insert_record("idx", PageId::new(1));
        assert_eq!(page.get_root_id("id"), None);
        assert_eq!(page.get_root_id("idx2"), None);
    }

    #[test]
    fn test_header_page_rejects_long_name() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPageMut::new(&mut data);
        let long = "x".repeat(NAME_SIZE + 1);
        assert!(!page.insert_record(&long, PageId::new(1)));
    }

    #[test]
    fn test_header_page_read_view_matches() {
        let mut data = [0u8; PAGE_SIZE];
        {
            let mut page = HeaderPageMut::new(&mut data);
            page.insert_record("idx", PageId::new(7));
        }
        let page = HeaderPageRef::new(&data);
        assert_eq!(page.num_records(), 1);
        assert_eq!(page.get_root_id("idx"), Some(PageId::new(7)));
    }
}
