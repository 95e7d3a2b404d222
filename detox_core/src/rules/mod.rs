mod age;
mod delete;
mod protect;


pub use age::{cutoff_date, cutoff_time, threshold_seconds, AgeCutoff, AgeUnit};
pub use delete::{
    DeleteByNameOlderThan, DeleteDeprecated, DeleteNotAccessedFor, DeleteOldUnused, DeletePartial,
    DeleteUnused,
};
pub use protect::{
    ProtectByNameDiskOnly, ProtectCustodial, ProtectDiskOnly, ProtectIncomplete,
    ProtectIncompleteTapeCopy, ProtectLocked, ProtectMinimumCopies, ProtectNewDiskOnly,
    ProtectNonreadySite, ProtectNotOwnedBy,
};
